// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Template Source and Trainer Directory
//!
//! Collaborator interfaces for the two read-only directories this system
//! consumes: the template catalog (immutable-per-read multi-day programs)
//! and the trainer directory. Template authoring and user administration
//! live elsewhere; this crate only reads.
//!
//! The default implementation is a catalog loaded once from a TOML file at
//! startup. Tests build a [`StaticCatalog`] directly from model values.

use crate::models::{PlannedActivity, Template, Trainer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveTime;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Read access to the template catalog
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn get_template(&self, id: &str) -> Result<Option<Template>>;

    async fn list_templates(&self) -> Result<Vec<Template>>;
}

/// Read access to the trainer directory
#[async_trait]
pub trait TrainerDirectory: Send + Sync {
    async fn list_trainers(&self) -> Result<Vec<Trainer>>;
}

/// In-memory catalog serving both directories
///
/// Reads are immutable snapshots of whatever the catalog held at load
/// time, which is exactly the consistency the template source offers.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    templates: Vec<Template>,
    trainers: Vec<Trainer>,
}

impl StaticCatalog {
    pub fn new(templates: Vec<Template>, trainers: Vec<Trainer>) -> Self {
        Self {
            templates,
            trainers,
        }
    }

    /// Load a catalog from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;

        let file: CatalogFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;

        let templates = file
            .templates
            .into_iter()
            .map(CatalogTemplate::into_template)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            templates,
            trainers: file.trainers,
        })
    }
}

#[async_trait]
impl TemplateSource for StaticCatalog {
    async fn get_template(&self, id: &str) -> Result<Option<Template>> {
        Ok(self.templates.iter().find(|t| t.id == id).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<Template>> {
        Ok(self.templates.clone())
    }
}

#[async_trait]
impl TrainerDirectory for StaticCatalog {
    async fn list_trainers(&self) -> Result<Vec<Trainer>> {
        Ok(self.trainers.clone())
    }
}

/// On-disk catalog file shape
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    templates: Vec<CatalogTemplate>,
    #[serde(default)]
    trainers: Vec<Trainer>,
}

#[derive(Debug, Deserialize)]
struct CatalogTemplate {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    total_days: u32,
    #[serde(default)]
    activities: Vec<CatalogActivity>,
}

#[derive(Debug, Deserialize)]
struct CatalogActivity {
    day: u32,
    name: String,
    /// Clock time as "HH:MM" (seconds accepted but not required)
    scheduled_start: String,
    duration_minutes: i64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl CatalogTemplate {
    fn into_template(self) -> Result<Template> {
        let activities = self
            .activities
            .into_iter()
            .map(|a| {
                let scheduled_start = parse_clock_time(&a.scheduled_start).with_context(|| {
                    format!(
                        "Invalid scheduled_start '{}' for activity '{}'",
                        a.scheduled_start, a.name
                    )
                })?;
                Ok(PlannedActivity {
                    day: a.day,
                    name: a.name,
                    scheduled_start,
                    duration_minutes: a.duration_minutes,
                    description: a.description,
                    tags: a.tags,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Template {
            id: self.id,
            name: self.name,
            description: self.description,
            total_days: self.total_days,
            activities,
        })
    }
}

fn parse_clock_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .context("expected HH:MM")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CATALOG_TOML: &str = r#"
[[trainers]]
id = "trainer-1"
name = "Alice"

[[trainers]]
id = "trainer-2"
name = "Bo"

[[templates]]
id = "onboarding"
name = "Onboarding week"
total_days = 2

[[templates.activities]]
day = 1
name = "Warmup"
scheduled_start = "09:00"
duration_minutes = 15

[[templates.activities]]
day = 1
name = "Welcome"
scheduled_start = "09:15"
duration_minutes = 30
description = "Introductions"
tags = ["plenary"]
"#;

    fn write_catalog(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn load_catalog_from_toml() {
        let file = write_catalog(CATALOG_TOML);
        let catalog = StaticCatalog::load(file.path()).unwrap();

        let template = catalog.get_template("onboarding").await.unwrap().unwrap();
        assert_eq!(template.name, "Onboarding week");
        assert_eq!(template.total_days, 2);
        assert_eq!(template.activities.len(), 2);
        assert_eq!(
            template.activities[0].scheduled_start,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        );
        assert_eq!(template.activities[1].tags, vec!["plenary"]);

        let trainers = catalog.list_trainers().await.unwrap();
        assert_eq!(trainers.len(), 2);
        assert_eq!(trainers[1].name, "Bo");
    }

    #[tokio::test]
    async fn unknown_template_is_none() {
        let file = write_catalog(CATALOG_TOML);
        let catalog = StaticCatalog::load(file.path()).unwrap();
        assert!(catalog.get_template("nope").await.unwrap().is_none());
    }

    #[test]
    fn bad_clock_time_is_rejected() {
        let file = write_catalog(
            r#"
[[templates]]
id = "t"
name = "T"
total_days = 1

[[templates.activities]]
day = 1
name = "A"
scheduled_start = "9 o'clock"
duration_minutes = 10
"#,
        );
        let err = StaticCatalog::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("scheduled_start"));
    }

    #[test]
    fn seconds_are_accepted() {
        assert_eq!(
            parse_clock_time("07:45:30").unwrap(),
            NaiveTime::from_hms_opt(7, 45, 30).unwrap()
        );
    }
}
