#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing mandatory {0} value")]
    Missing(&'static str),

    #[error("Invalid {key} value '{value}': expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}
