//! Hugging Face token resolution

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::ModelVariant;

/// Environment variable consulted for the token and exported to children
pub const TOKEN_ENV: &str = "HUGGING_FACE_TOKEN";

/// Value shipped in template environments that means "not set"
const PLACEHOLDER_TOKEN: &str = "token_here";

/// Where a resolved token came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    Prompt,
}

/// A Hugging Face access token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct HfToken {
    secret: String,
    pub source: TokenSource,
}

impl HfToken {
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for HfToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfToken")
            .field("secret", &"***")
            .field("source", &self.source)
            .finish()
    }
}

/// Returns a usable token from an environment value, ignoring blanks and the
/// template placeholder.
pub fn token_from_env(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != PLACEHOLDER_TOKEN)
        .map(str::to_string)
}

/// Resolve the token for `variant`. `ask` is only called when the model is
/// gated and the environment has nothing usable.
pub fn resolve_token<F>(
    variant: ModelVariant,
    env_value: Option<&str>,
    ask: F,
) -> Result<Option<HfToken>>
where
    F: FnOnce() -> Result<String>,
{
    if !variant.requires_token() {
        return Ok(None);
    }

    if let Some(secret) = token_from_env(env_value) {
        debug!("Using Hugging Face token from {}", TOKEN_ENV);
        return Ok(Some(HfToken {
            secret,
            source: TokenSource::Environment,
        }));
    }

    let answer = ask()?;
    let secret = answer.trim();
    if secret.is_empty() {
        return Err(Error::MissingToken(variant.display_name().to_string()));
    }
    Ok(Some(HfToken {
        secret: secret.to_string(),
        source: TokenSource::Prompt,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ungated_model_never_asks() {
        let token = resolve_token(ModelVariant::Sdxl, None, || {
            panic!("should not prompt")
        })
        .unwrap();
        assert!(token.is_none());
    }

    #[test]
    fn test_env_token_wins() {
        let token = resolve_token(ModelVariant::Flux, Some("hf_abc"), || {
            panic!("should not prompt")
        })
        .unwrap()
        .unwrap();
        assert_eq!(token.secret(), "hf_abc");
        assert_eq!(token.source, TokenSource::Environment);
    }

    #[test]
    fn test_placeholder_falls_through_to_prompt() {
        let token = resolve_token(ModelVariant::Flux, Some("token_here"), || {
            Ok("  hf_typed \n".to_string())
        })
        .unwrap()
        .unwrap();
        assert_eq!(token.secret(), "hf_typed");
        assert_eq!(token.source, TokenSource::Prompt);
    }

    #[test]
    fn test_empty_answer_is_error() {
        let result = resolve_token(ModelVariant::Flux, None, || Ok(String::new()));
        assert!(matches!(result, Err(Error::MissingToken(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let token = HfToken {
            secret: "hf_secret".to_string(),
            source: TokenSource::Prompt,
        };
        assert!(!format!("{token:?}").contains("hf_secret"));
    }
}
