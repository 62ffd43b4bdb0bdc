use std::{convert::Infallible, str::FromStr};

use rama::{
    error::{BoxError, ErrorContext as _, ErrorExt as _},
    http::{HeaderValue, Uri},
};
use secrecy::{ExposeSecret as _, SecretString};

/// Named comparison endpoint every batch is submitted to.
#[derive(Debug, Clone)]
pub struct Target {
    name: String,
    add: Uri,
    list_add: Uri,
}

impl Target {
    /// Resolve the insert routes of `name` relative to `base`.
    ///
    /// Names are single path segments: ASCII alphanumeric, `-` or `_`.
    pub fn try_new(base: &Uri, name: &str) -> Result<Self, BoxError> {
        if name.is_empty() {
            return Err(BoxError::from("target name cannot be empty"));
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(BoxError::from("target name contains invalid characters")
                .context_str_field("name", name.to_owned()));
        }

        let endpoint = format!("{}/{name}", base.to_string().trim_end_matches('/'));
        let add = format!("{endpoint}/add")
            .parse::<Uri>()
            .context("parse target add uri")
            .with_context_field("endpoint", || endpoint.clone())?;
        let list_add = format!("{endpoint}/list/add")
            .parse::<Uri>()
            .context("parse target list add uri")
            .with_context_field("endpoint", || endpoint.clone())?;

        Ok(Self {
            name: name.to_owned(),
            add,
            list_add,
        })
    }

    /// Build all targets for a base uri, keeping the declared order.
    pub fn try_new_all<S: AsRef<str>>(base: &Uri, names: &[S]) -> Result<Vec<Self>, BoxError> {
        if names.is_empty() {
            return Err(BoxError::from("at least one target is required"));
        }
        names
            .iter()
            .map(|name| Self::try_new(base, name.as_ref()))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Route used for a single event.
    pub fn add_uri(&self) -> &Uri {
        &self.add
    }

    /// Route used for a list of events.
    pub fn list_add_uri(&self) -> &Uri {
        &self.list_add
    }
}

/// Bearer credential attached to every submitted request.
#[derive(Debug)]
pub struct Credential(SecretString);

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self::new(self.0.expose_secret())
    }
}

impl FromStr for Credential {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::from(secret.into()))
    }

    /// `Authorization` header value, flagged as sensitive.
    pub fn bearer_header_value(&self) -> Result<HeaderValue, BoxError> {
        let mut value = HeaderValue::try_from(format!("Bearer {}", self.0.expose_secret()))
            .context("encode bearer credential as header value")?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Whether an `Authorization` header value carries this credential.
    pub fn matches(&self, value: &HeaderValue) -> bool {
        value
            .to_str()
            .ok()
            .and_then(|s| s.strip_prefix("Bearer "))
            .is_some_and(|token| token == self.0.expose_secret())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_routes() {
        for base in ["http://localhost:9090", "http://localhost:9090/"] {
            let base: Uri = base.parse().unwrap();
            let target = Target::try_new(&base, "noindex").unwrap();
            assert_eq!(target.name(), "noindex");
            assert_eq!(
                target.add_uri().to_string(),
                "http://localhost:9090/noindex/add"
            );
            assert_eq!(
                target.list_add_uri().to_string(),
                "http://localhost:9090/noindex/list/add"
            );
        }
    }

    #[test]
    fn test_target_with_base_path() {
        let base: Uri = "https://example.com/api/v1".parse().unwrap();
        let target = Target::try_new(&base, "tsv").unwrap();
        assert_eq!(
            target.add_uri().to_string(),
            "https://example.com/api/v1/tsv/add"
        );
    }

    #[test]
    fn test_target_invalid_names() {
        let base: Uri = "http://localhost:9090".parse().unwrap();
        for name in ["", "a/b", "with space", "ü"] {
            assert!(Target::try_new(&base, name).is_err(), "name = {name:?}");
        }
        assert!(Target::try_new_all::<&str>(&base, &[]).is_err());
    }

    #[test]
    fn test_target_order_is_kept() {
        let base: Uri = "http://localhost:9090".parse().unwrap();
        let targets = Target::try_new_all(&base, &["noindex", "tsv", "createatuser"]).unwrap();
        let names: Vec<_> = targets.iter().map(Target::name).collect();
        assert_eq!(names, ["noindex", "tsv", "createatuser"]);
    }

    #[test]
    fn test_credential() {
        let credential = Credential::new("shhhh");

        let value = credential.bearer_header_value().unwrap();
        assert!(value.is_sensitive());
        assert_eq!(value, "Bearer shhhh");
        assert!(credential.matches(&value));

        assert!(!credential.matches(&HeaderValue::from_static("Bearer nope")));
        assert!(!credential.matches(&HeaderValue::from_static("shhhh")));

        assert!(!format!("{credential:?}").contains("shhhh"));

        let parsed: Credential = "shhhh".parse().unwrap();
        assert!(parsed.clone().matches(&value));
    }
}
