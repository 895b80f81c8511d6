//! Parsing of confirmation links.
//!
//! A confirmation link carries its credential either in the fragment
//! (`#access_token=...&refresh_token=...&type=signup`, implicit flow) or in the
//! query (`?code=...`, PKCE flow). Failed redirects carry `error` and
//! `error_description` in the query instead.

use secrecy::SecretString;
use url::Url;

/// Fragment `type` value for sign-up confirmations.
pub const SIGNUP_TYPE: &str = "signup";

/// Token pair found in a link fragment.
pub struct FragmentToken {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub kind: Option<String>,
}

impl FragmentToken {
    #[must_use]
    pub fn is_signup(&self) -> bool {
        self.kind.as_deref() == Some(SIGNUP_TYPE)
    }
}

impl std::fmt::Debug for FragmentToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentToken")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("kind", &self.kind)
            .finish()
    }
}

/// Error reported by the auth service through the redirect query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkError {
    pub error: String,
    pub description: Option<String>,
}

/// Everything the confirmation flows read from the current location.
#[derive(Debug, Default)]
pub struct ConfirmationLink {
    pub fragment: Option<FragmentToken>,
    pub code: Option<SecretString>,
    pub error: Option<LinkError>,
}

impl ConfirmationLink {
    #[must_use]
    pub fn parse(location: &Url) -> Self {
        let fragment = location.fragment().and_then(parse_fragment);

        let query: Vec<(String, String)> = location.query_pairs().into_owned().collect();
        let code = first_value(&query, "code").map(|code| SecretString::from(code.to_string()));
        let error = first_value(&query, "error").map(|error| LinkError {
            error: error.to_string(),
            description: first_value(&query, "error_description").map(str::to_string),
        });

        Self {
            fragment,
            code,
            error,
        }
    }

    /// Fragment token when it is a sign-up confirmation.
    #[must_use]
    pub fn signup_token(&self) -> Option<&FragmentToken> {
        self.fragment.as_ref().filter(|token| token.is_signup())
    }

    /// User-facing message for a failed redirect, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .map(|err| err.description.as_deref().unwrap_or(err.error.as_str()))
    }
}

/// Value of the first `key` pair, `None` when absent or empty. Later
/// duplicates are ignored.
fn first_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}

fn parse_fragment(fragment: &str) -> Option<FragmentToken> {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(fragment.as_bytes())
        .into_owned()
        .collect();

    first_value(&pairs, "access_token").map(|access| FragmentToken {
        access_token: SecretString::from(access.to_string()),
        refresh_token: SecretString::from(
            first_value(&pairs, "refresh_token")
                .unwrap_or_default()
                .to_string(),
        ),
        kind: first_value(&pairs, "type").map(str::to_string),
    })
}

/// The location with its fragment removed, as shown after `replaceState`.
#[must_use]
pub fn strip_fragment(location: &Url) -> Url {
    let mut visible = location.clone();
    visible.set_fragment(None);
    visible
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn url(value: &str) -> Url {
        Url::parse(value).unwrap()
    }

    #[test]
    fn parses_signup_fragment() {
        let link = ConfirmationLink::parse(&url(
            "https://arx.health/email-confirmed#access_token=abc&refresh_token=def&expires_in=3600&type=signup",
        ));
        let token = link.signup_token().unwrap();
        assert_eq!(token.access_token.expose_secret(), "abc");
        assert_eq!(token.refresh_token.expose_secret(), "def");
        assert!(link.code.is_none());
        assert!(link.error.is_none());
    }

    #[test]
    fn fragment_without_signup_type_is_not_a_signup_token() {
        let link = ConfirmationLink::parse(&url(
            "https://arx.health/email-confirmed#access_token=abc&type=recovery",
        ));
        assert!(link.fragment.is_some());
        assert!(link.signup_token().is_none());
    }

    #[test]
    fn missing_refresh_token_defaults_to_empty() {
        let link =
            ConfirmationLink::parse(&url("https://arx.health/#access_token=abc&type=signup"));
        let token = link.signup_token().unwrap();
        assert_eq!(token.refresh_token.expose_secret(), "");
    }

    #[test]
    fn parses_code_and_error_query() {
        let link = ConfirmationLink::parse(&url(
            "https://arx.health/email-confirmed?code=8f1d&error=access_denied&error_description=Email+link+is+invalid+or+has+expired",
        ));
        assert_eq!(link.code.as_ref().unwrap().expose_secret(), "8f1d");
        assert_eq!(
            link.error_message(),
            Some("Email link is invalid or has expired")
        );
    }

    #[test]
    fn error_without_description_falls_back_to_code() {
        let link = ConfirmationLink::parse(&url("https://arx.health/?error=server_error"));
        assert_eq!(link.error_message(), Some("server_error"));
    }

    #[test]
    fn empty_values_are_ignored() {
        let link = ConfirmationLink::parse(&url("https://arx.health/?code=#access_token="));
        assert!(link.code.is_none());
        assert!(link.fragment.is_none());
    }

    #[test]
    fn repeated_keys_keep_the_first_value() {
        let link = ConfirmationLink::parse(&url(
            "https://arx.health/?code=first&code=second&error=a&error=b#access_token=one&access_token=two&type=signup&type=recovery",
        ));
        assert_eq!(link.code.as_ref().unwrap().expose_secret(), "first");
        assert_eq!(link.error_message(), Some("a"));
        let token = link.signup_token().unwrap();
        assert_eq!(token.access_token.expose_secret(), "one");
    }

    #[test]
    fn strip_fragment_keeps_path_and_query() {
        let visible = strip_fragment(&url(
            "https://arx.health/email-confirmed?x=1#access_token=abc&type=signup",
        ));
        assert_eq!(visible.as_str(), "https://arx.health/email-confirmed?x=1");
    }

    #[test]
    fn debug_redacts_tokens() {
        let link =
            ConfirmationLink::parse(&url("https://arx.health/#access_token=abc&type=signup"));
        let rendered = format!("{:?}", link.fragment.unwrap());
        assert!(!rendered.contains("abc"));
    }
}
