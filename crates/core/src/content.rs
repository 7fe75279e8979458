//! Public site content.
//!
//! The landing page shown to patients has three editable sections: a hero banner, an
//! about block and a list of service cards. Staff edit them through a
//! [`ContentManager`], which checks every change with the same [`ErrorMap`] structure the
//! registration forms use and keeps the stored content unchanged when a change is
//! rejected.
//!
//! Content is authored as YAML:
//!
//! ```yaml
//! hero:
//!   title: Care close to home
//!   subtitle: Walk-in and booked appointments
//!   ctaLabel: Register
//!   ctaHref: /register
//! about:
//!   heading: About us
//!   body: A community hospital since 1962.
//!   highlights: [24/7 emergency, On-site pharmacy]
//! services:
//!   - title: Maternity
//!     description: Antenatal and postnatal care.
//! ```

use crate::error::{RegistrationError, RegistrationResult};
use crate::validation::{ErrorMap, FieldError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroSection {
    pub title: String,
    pub subtitle: String,
    pub cta_label: String,
    /// Site path (`/register`), `http(s)://` URL or `#anchor`.
    pub cta_href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutSection {
    pub heading: String,
    pub body: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCard {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContent {
    pub hero: HeroSection,
    pub about: AboutSection,
    #[serde(default)]
    pub services: Vec<ServiceCard>,
}

impl SiteContent {
    /// Parses content from a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::Yaml` if the document does not match the content shape.
    pub fn from_yaml_str(yaml: &str) -> RegistrationResult<Self> {
        serde_yaml::from_str(yaml).map_err(RegistrationError::Yaml)
    }

    /// Reads and parses a YAML content file.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::FileRead` if the file cannot be read and
    /// `RegistrationError::Yaml` if it cannot be parsed.
    pub fn load(path: &Path) -> RegistrationResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(RegistrationError::FileRead)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> RegistrationResult<String> {
        serde_yaml::to_string(self).map_err(RegistrationError::Yaml)
    }
}

fn require(errors: &mut ErrorMap, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.insert(field, FieldError::RequiredField);
    }
}

fn is_valid_href(href: &str) -> bool {
    let href = href.trim();
    (href.starts_with('/') && !href.starts_with("//"))
        || (href.len() > 1 && href.starts_with('#'))
        || ["http://", "https://"]
            .iter()
            .any(|scheme| href.len() > scheme.len() && href.starts_with(scheme))
}

pub fn validate_hero(hero: &HeroSection) -> ErrorMap {
    let mut errors = ErrorMap::new();
    require(&mut errors, "title", &hero.title);
    require(&mut errors, "subtitle", &hero.subtitle);
    require(&mut errors, "ctaLabel", &hero.cta_label);

    if hero.cta_href.trim().is_empty() {
        errors.insert("ctaHref", FieldError::RequiredField);
    } else if !is_valid_href(&hero.cta_href) {
        errors.insert("ctaHref", FieldError::InvalidFormat);
    }

    if let Some(image) = &hero.image_url {
        if !image.trim().is_empty() && !is_valid_href(image) {
            errors.insert("imageUrl", FieldError::InvalidFormat);
        }
    }
    errors
}

pub fn validate_about(about: &AboutSection) -> ErrorMap {
    let mut errors = ErrorMap::new();
    require(&mut errors, "heading", &about.heading);
    require(&mut errors, "body", &about.body);
    for (i, highlight) in about.highlights.iter().enumerate() {
        require(&mut errors, &format!("highlights[{i}]"), highlight);
    }
    errors
}

/// Validates the service list: at least one card, every card complete, and titles
/// unique ignoring case. A repeated title is reported on the later card.
pub fn validate_services(services: &[ServiceCard]) -> ErrorMap {
    let mut errors = ErrorMap::new();
    if services.is_empty() {
        errors.insert("services", FieldError::RequiredField);
        return errors;
    }

    let mut seen = std::collections::HashSet::new();
    for (i, service) in services.iter().enumerate() {
        let prefix = format!("services[{i}]");
        require(&mut errors, &format!("{prefix}.title"), &service.title);
        require(&mut errors, &format!("{prefix}.description"), &service.description);

        let key = service.title.trim().to_lowercase();
        if !key.is_empty() && !seen.insert(key) {
            errors.insert(format!("{prefix}.title"), FieldError::DuplicateEntry);
        }
    }
    errors
}

/// Validates a whole content document, keying errors `hero.*`, `about.*` and
/// `services[i].*`.
pub fn validate_site_content(content: &SiteContent) -> ErrorMap {
    let mut errors = validate_hero(&content.hero).prefixed("hero");
    errors.merge(validate_about(&content.about).prefixed("about"));
    errors.merge(validate_services(&content.services));
    errors
}

/// Holds the current site content and applies validated edits to it.
#[derive(Clone, Debug)]
pub struct ContentManager {
    content: SiteContent,
}

impl ContentManager {
    /// Wraps `content` after validating it.
    ///
    /// # Errors
    ///
    /// Returns every field problem found if the content is not publishable.
    pub fn new(content: SiteContent) -> Result<Self, ErrorMap> {
        let errors = validate_site_content(&content);
        if errors.has_errors() {
            return Err(errors);
        }
        Ok(Self { content })
    }

    pub fn content(&self) -> &SiteContent {
        &self.content
    }

    pub fn replace_hero(&mut self, hero: HeroSection) -> Result<(), ErrorMap> {
        let errors = validate_hero(&hero).prefixed("hero");
        if errors.has_errors() {
            return Err(errors);
        }
        self.content.hero = hero;
        tracing::info!("site hero replaced");
        Ok(())
    }

    pub fn replace_about(&mut self, about: AboutSection) -> Result<(), ErrorMap> {
        let errors = validate_about(&about).prefixed("about");
        if errors.has_errors() {
            return Err(errors);
        }
        self.content.about = about;
        tracing::info!("site about section replaced");
        Ok(())
    }

    /// Adds a service card, or replaces the card whose title matches ignoring case.
    ///
    /// # Returns
    ///
    /// The card that was replaced, if any.
    pub fn upsert_service(&mut self, service: ServiceCard) -> Result<Option<ServiceCard>, ErrorMap> {
        let mut services = self.content.services.clone();
        let existing = self.position_of(&service.title);
        let replaced = match existing {
            Some(index) => Some(std::mem::replace(&mut services[index], service)),
            None => {
                services.push(service);
                None
            }
        };

        let errors = validate_services(&services);
        if errors.has_errors() {
            return Err(errors);
        }
        self.content.services = services;
        Ok(replaced)
    }

    /// Removes the service card whose title matches ignoring case.
    ///
    /// # Returns
    ///
    /// The removed card, or `None` if no card has that title.
    ///
    /// # Errors
    ///
    /// Removing the last remaining card is rejected with `services: RequiredField`.
    pub fn remove_service(&mut self, title: &str) -> Result<Option<ServiceCard>, ErrorMap> {
        let Some(index) = self.position_of(title) else {
            return Ok(None);
        };
        if self.content.services.len() == 1 {
            let mut errors = ErrorMap::new();
            errors.insert("services", FieldError::RequiredField);
            return Err(errors);
        }
        let removed = self.content.services.remove(index);
        tracing::info!("site service '{}' removed", removed.title);
        Ok(Some(removed))
    }

    fn position_of(&self, title: &str) -> Option<usize> {
        let key = title.trim().to_lowercase();
        self.content
            .services
            .iter()
            .position(|s| s.title.trim().to_lowercase() == key)
    }
}
