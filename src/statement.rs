//! statement
//!
//! Creation statement schema.
//!
//! The first creation statement of a `new_user` request is a JSON object
//! naming the branch and role of the password:
//!
//! ```json
//! {"branch": "dev", "role": "reader"}
//! ```
//!
//! Missing or empty values fall back to `main` and `admin`.

use serde::Deserialize;

use crate::error::DbPluginError;

/// Branch used when the statement does not name one.
pub const DEFAULT_BRANCH: &str = "main";

/// Role used when the statement does not name one.
pub const DEFAULT_ROLE: &str = "admin";

/// Parsed creation statement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreationStatement {
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub role: String,
}

impl CreationStatement {
    /// Parse the first command, applying defaults.
    ///
    /// # Errors
    ///
    /// - `EmptyStatement` if `commands` is empty
    /// - `InvalidStatement` if the first command is not a JSON object
    pub fn from_commands(commands: &[String]) -> Result<Self, DbPluginError> {
        let first = commands.first().ok_or(DbPluginError::EmptyStatement)?;

        let mut statement: CreationStatement = serde_json::from_str(first)
            .map_err(|e| DbPluginError::InvalidStatement(e.to_string()))?;

        if statement.branch.is_empty() {
            statement.branch = DEFAULT_BRANCH.to_string();
        }
        if statement.role.is_empty() {
            statement.role = DEFAULT_ROLE.to_string();
        }
        Ok(statement)
    }
}
