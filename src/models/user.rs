use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct SetUsernameRequest {
    #[validate(length(min = 3, max = 30))]
    pub username: String,
}

impl SetUsernameRequest {
    /// Letters, digits, `_`, `.` and `-` only.
    pub fn has_valid_chars(&self) -> bool {
        self.username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    }
}
