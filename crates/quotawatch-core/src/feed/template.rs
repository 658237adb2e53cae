//! Notification message rendering

use crate::config::TemplateConfig;
use crate::models::{format_gigabytes, EntityKind, QuotaRecord};

/// Rendered title and body of a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Post title
    pub title: String,
    /// Post body
    pub body: String,
}

/// Title/body template with `{placeholder}` substitution
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    title: String,
    body: String,
    request_url: String,
}

impl MessageTemplate {
    /// Create a template from configuration
    pub fn new(config: &TemplateConfig) -> Self {
        Self {
            title: config.title.clone(),
            body: config.body.clone(),
            request_url: config.request_url.clone(),
        }
    }

    /// Render the message for a breaching quota
    pub fn render(&self, quota: &QuotaRecord, threshold_percent: f64) -> RenderedMessage {
        let entity = match quota.entity_kind {
            EntityKind::User => "user",
            EntityKind::Group => "group",
        };
        let values = [
            ("{entity}", entity.to_string()),
            ("{name}", quota.display_name.clone()),
            ("{threshold}", format_number(threshold_percent)),
            ("{used}", format_gigabytes(quota.used_bytes)),
            ("{limit}", format_gigabytes(quota.limit_bytes)),
            ("{percent}", format_number(quota.utilization_percent())),
            ("{request_url}", self.request_url.clone()),
        ];

        RenderedMessage {
            title: substitute(&self.title, &values),
            body: substitute(&self.body, &values),
        }
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::new(&TemplateConfig::default())
    }
}

fn substitute(template: &str, values: &[(&str, String)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (placeholder, value)| {
            acc.replace(placeholder, value)
        })
}

/// Two decimals, trailing zeros trimmed: `90`, `92.5`, `33.33`
fn format_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn quota(kind: EntityKind) -> QuotaRecord {
        QuotaRecord {
            quota_id: 1,
            entity_id: 2,
            entity_kind: kind,
            display_name: "Marketing".to_string(),
            used_bytes: 95_000_000_000,
            limit_bytes: 100_000_000_000,
        }
    }

    #[test]
    fn test_default_template() {
        let message = MessageTemplate::default().render(&quota(EntityKind::Group), 90.0);

        assert_eq!(
            message.title,
            "More than 90% of the disk space of group Marketing is in use."
        );
        assert_eq!(
            message.body,
            "Available space: 100 GB. Current usage: 95 GB (95%). \
             To increase the disk quota, file a request via /services/disk.quota/."
        );
    }

    #[test]
    fn test_custom_template() {
        let template = MessageTemplate::new(&TemplateConfig {
            title: "{entity} {name}: {percent}% > {threshold}%".to_string(),
            body: "{used} / {limit}".to_string(),
            request_url: String::new(),
        });

        let message = template.render(&quota(EntityKind::User), 92.5);
        assert_eq!(message.title, "user Marketing: 95% > 92.5%");
        assert_eq!(message.body, "95 GB / 100 GB");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(90.0), "90");
        assert_eq!(format_number(100.0 / 3.0), "33.33");
    }
}
