//! Bearer token resolution.
//!
//! Precedence, first match wins:
//!
//! 1. the domain's own key (`SEARCH_API_TOKEN`, `BULK_API_TOKEN`, `VULN_API_TOKEN`)
//! 2. the shared `API_TOKEN`
//!
//! Blank values count as unset.

use std::fmt;

use super::{Config, ConfigError};

pub const SHARED_TOKEN_KEY: &str = "API_TOKEN";

/// A group of upstream calls that may carry its own credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDomain {
    Search,
    Bulk,
    Vulnerabilities,
}

impl TokenDomain {
    pub fn env_key(self) -> &'static str {
        match self {
            TokenDomain::Search => "SEARCH_API_TOKEN",
            TokenDomain::Bulk => "BULK_API_TOKEN",
            TokenDomain::Vulnerabilities => "VULN_API_TOKEN",
        }
    }
}

impl fmt::Display for TokenDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenDomain::Search => "search",
            TokenDomain::Bulk => "bulk",
            TokenDomain::Vulnerabilities => "vulnerabilities",
        })
    }
}

impl Config {
    fn domain_token(&self, domain: TokenDomain) -> Option<&str> {
        match domain {
            TokenDomain::Search => self.search_api_token.as_deref(),
            TokenDomain::Bulk => self.bulk_api_token.as_deref(),
            TokenDomain::Vulnerabilities => self.vuln_api_token.as_deref(),
        }
    }

    /// The token to send for `domain`.
    pub fn resolve_token(&self, domain: TokenDomain) -> Result<&str, ConfigError> {
        fn usable(token: Option<&str>) -> Option<&str> {
            token.map(str::trim).filter(|t| !t.is_empty())
        }

        usable(self.domain_token(domain))
            .or_else(|| usable(self.api_token.as_deref()))
            .ok_or(ConfigError::MissingToken {
                domain,
                domain_key: domain.env_key(),
                shared_key: SHARED_TOKEN_KEY,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn domain_token_wins_over_shared() {
        Jail::expect_with(|jail| {
            jail.set_env("SEARCH_API_URL", "https://search.example/");
            jail.set_env("API_TOKEN", "shared");
            jail.set_env("BULK_API_TOKEN", "bulk-only");
            let config = Config::load()?;

            assert_eq!(config.resolve_token(TokenDomain::Bulk).unwrap(), "bulk-only");
            assert_eq!(config.resolve_token(TokenDomain::Search).unwrap(), "shared");
            assert_eq!(
                config.resolve_token(TokenDomain::Vulnerabilities).unwrap(),
                "shared"
            );
            Ok(())
        });
    }

    #[test]
    fn blank_domain_token_falls_back() {
        Jail::expect_with(|jail| {
            jail.set_env("SEARCH_API_URL", "https://search.example/");
            jail.set_env("API_TOKEN", "shared");
            jail.set_env("SEARCH_API_TOKEN", "  ");
            let config = Config::load()?;
            assert_eq!(config.resolve_token(TokenDomain::Search).unwrap(), "shared");
            Ok(())
        });
    }

    #[test]
    fn missing_everywhere_names_both_keys() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("SEARCH_API_URL", "https://search.example/");
            let config = Config::load()?;
            let err = config.resolve_token(TokenDomain::Vulnerabilities).unwrap_err();
            let message = err.to_string();
            assert!(message.contains("VULN_API_TOKEN"));
            assert!(message.contains("API_TOKEN"));
            Ok(())
        });
    }
}
