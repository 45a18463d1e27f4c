//! username
//!
//! Credential name generation.
//!
//! A [`UsernameGenerator`] renders a username template against the request's
//! display name and role name. Construction compiles the template and renders
//! it once with empty metadata, so a broken template is rejected at
//! initialize instead of on the first issued credential.
//!
//! Whatever the template produces, the result is capped at
//! [`MAX_USERNAME_LEN`] characters.

use std::collections::HashMap;

use crate::database::UsernameMetadata;
use crate::error::DbPluginError;
use crate::template::{truncate, StringTemplate};

/// Longest username the platform accepts as a password display name.
pub const MAX_USERNAME_LEN: usize = 63;

/// Renders usernames from a compiled template.
#[derive(Debug, Clone)]
pub struct UsernameGenerator {
    template: StringTemplate,
}

impl UsernameGenerator {
    /// Compile and self-check a template.
    ///
    /// # Errors
    ///
    /// `Template` if the template does not parse or does not render with
    /// empty metadata.
    pub fn new(source: &str) -> Result<Self, DbPluginError> {
        let template =
            StringTemplate::parse(source).map_err(|source| DbPluginError::Template {
                context: "unable to initialize username template",
                source,
            })?;
        let generator = Self { template };

        generator
            .render(&UsernameMetadata::default())
            .map_err(|source| DbPluginError::Template {
                context: "invalid username template",
                source,
            })?;

        Ok(generator)
    }

    /// Generate a username for the given metadata.
    pub fn generate(&self, metadata: &UsernameMetadata) -> Result<String, DbPluginError> {
        self.render(metadata)
            .map_err(|source| DbPluginError::Template {
                context: "failed to generate username",
                source,
            })
    }

    fn render(&self, metadata: &UsernameMetadata) -> Result<String, crate::template::TemplateError> {
        let fields = HashMap::from([
            ("DisplayName", metadata.display_name.clone()),
            ("RoleName", metadata.role_name.clone()),
        ]);
        let rendered = self.template.render(&fields)?;
        Ok(truncate(&rendered, MAX_USERNAME_LEN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USERNAME_TEMPLATE;
    use crate::error::ErrorKind;

    fn meta(display: &str, role: &str) -> UsernameMetadata {
        UsernameMetadata {
            display_name: display.into(),
            role_name: role.into(),
        }
    }

    #[test]
    fn default_template_generates_expected_shape() {
        let generator = UsernameGenerator::new(DEFAULT_USERNAME_TEMPLATE).unwrap();
        let name = generator.generate(&meta("alice", "")).unwrap();
        assert!(name.starts_with("v-alice--"));
        assert!(name.chars().count() <= MAX_USERNAME_LEN);
    }

    #[test]
    fn two_calls_differ() {
        let generator = UsernameGenerator::new(DEFAULT_USERNAME_TEMPLATE).unwrap();
        let m = meta("alice", "reader");
        let a = generator.generate(&m).unwrap();
        let b = generator.generate(&m).unwrap();
        assert_ne!(a, b);
        for name in [&a, &b] {
            assert!(name.contains("alice"));
            assert!(name.contains("reader"));
        }
    }

    #[test]
    fn output_capped_even_if_template_does_not_truncate() {
        let generator = UsernameGenerator::new("{{ random 100 }}").unwrap();
        let name = generator.generate(&meta("", "")).unwrap();
        assert_eq!(name.chars().count(), MAX_USERNAME_LEN);
    }

    #[test]
    fn unparseable_template_rejected() {
        let err = UsernameGenerator::new("{{ printf ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Template);
        assert!(err.to_string().starts_with("unable to initialize username template"));
    }

    #[test]
    fn unrenderable_template_rejected_eagerly() {
        let err = UsernameGenerator::new("{{ .Missing }}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Template);
        assert!(err.to_string().starts_with("invalid username template"));
    }

    #[test]
    fn custom_template() {
        let generator =
            UsernameGenerator::new(r#"{{ printf "ps_%s" (.RoleName | lowercase) }}"#).unwrap();
        assert_eq!(generator.generate(&meta("x", "Reader")).unwrap(), "ps_reader");
    }
}
