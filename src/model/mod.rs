/// Directory Data Model
///
/// Identity records, WebFinger profile documents, and the account/locator
/// vocabulary shared by the record store and the directory service.
use crate::error::{DirectoryError, DirectoryResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Well-known link relationship values
pub mod rel {
    pub const SELF: &str = "self";
    pub const PROFILE_PAGE: &str = "http://webfinger.net/rel/profile-page";
    pub const SUBSCRIBE: &str = "http://ostatus.org/schema/1.0/subscribe";
}

/// Media types used in generated links
pub mod media_type {
    pub const HTML: &str = "text/html";
    pub const ACTIVITY_JSON: &str = "application/activity+json";
}

/// Normalize a locator to the canonical `acct:` form.
///
/// The scheme check is byte-wise; locators are untrusted input and may
/// put a multibyte character anywhere, including across the prefix
/// boundary.
pub fn normalize_locator(raw: &str) -> String {
    let has_scheme = raw
        .as_bytes()
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(b"acct:"));

    if has_scheme {
        raw.to_string()
    } else {
        format!("acct:{}", raw)
    }
}

/// A single WebFinger link
///
/// Carries either a resolved `href` or a URI `template`; neither is
/// mandatory on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titles: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl Link {
    /// A link with a resolved target
    pub fn with_href(rel: &str, media_type: &str, href: String) -> Self {
        Self {
            rel: rel.to_string(),
            media_type: Some(media_type.to_string()),
            href: Some(href),
            titles: None,
            template: None,
        }
    }

    /// A link carrying a URI template instead of a resolved target
    pub fn with_template(rel: &str, template: String) -> Self {
        Self {
            rel: rel.to_string(),
            media_type: None,
            href: None,
            titles: None,
            template: Some(template),
        }
    }
}

/// Filter a link list to a relationship subset, preserving order.
///
/// An empty subset means no filtering.
pub fn filter_links(links: &[Link], relationships: &[String]) -> Vec<Link> {
    if relationships.is_empty() {
        return links.to_vec();
    }

    links
        .iter()
        .filter(|link| relationships.iter().any(|r| r == &link.rel))
        .cloned()
        .collect()
}

/// A federated account: the (server, handle) pair behind one profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub server: String,
    pub handle: String,
}

impl Account {
    pub fn new(server: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            handle: handle.into(),
        }
    }

    /// Deterministic key used to name this account's persisted unit
    pub fn key(&self) -> String {
        format!("{}_{}", self.server.replace('.', "_dot_"), self.handle)
    }

    /// The WebFinger subject for this account
    pub fn subject(&self) -> String {
        format!("acct:{}@{}", self.handle, self.server)
    }

    /// Canonical profile aliases derived from the account
    pub fn aliases(&self) -> Vec<String> {
        vec![
            format!("https://{}/@{}", self.server, self.handle),
            format!("https://{}/users/{}", self.server, self.handle),
        ]
    }

    /// Canonical fediverse links derived from the account
    pub fn links(&self) -> Vec<Link> {
        vec![
            Link::with_href(
                rel::PROFILE_PAGE,
                media_type::HTML,
                format!("https://{}/@{}", self.server, self.handle),
            ),
            Link::with_href(
                rel::SELF,
                media_type::ACTIVITY_JSON,
                format!("https://{}/users/{}", self.server, self.handle),
            ),
            Link::with_template(
                rel::SUBSCRIBE,
                format!("https://{}/authorize_interaction?uri={{uri}}", self.server),
            ),
        ]
    }
}

/// An identity record held by the record store
///
/// Ids are assigned by the store on insert and never change afterwards.
/// A locator belongs to at most one record at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default)]
    pub id: i64,

    pub name: String,

    pub email: String,

    #[serde(default)]
    pub locators: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,

    pub account: Account,
}

impl Person {
    /// Reject records missing mandatory identity fields, before any
    /// persistence attempt.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.name.trim().is_empty() {
            return Err(DirectoryError::Validation("name is required".to_string()));
        }
        if self.email.trim().is_empty() {
            return Err(DirectoryError::Validation("email is required".to_string()));
        }
        if self.account.server.trim().is_empty() {
            return Err(DirectoryError::Validation(
                "account server is required".to_string(),
            ));
        }
        if self.account.handle.trim().is_empty() {
            return Err(DirectoryError::Validation(
                "account handle is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// The WebFinger document published for this record
    pub fn profile(&self) -> ProfileRecord {
        ProfileRecord {
            subject: self.account.subject(),
            aliases: Some(self.aliases.iter().cloned().collect()),
            links: Some(self.links.clone()),
            properties: None,
        }
    }

    /// Non-mutating projection to a relationship subset.
    ///
    /// Identity fields are carried over unchanged; an empty subset returns
    /// the record as-is.
    pub fn with_filtered_links(&self, relationships: &[String]) -> Person {
        if relationships.is_empty() {
            return self.clone();
        }

        Person {
            links: filter_links(&self.links, relationships),
            ..self.clone()
        }
    }
}

/// A published WebFinger profile document (JRD)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub subject: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
}

impl ProfileRecord {
    /// Generate the canonical profile document for an account
    pub fn for_account(account: &Account) -> Self {
        Self {
            subject: account.subject(),
            aliases: Some(account.aliases()),
            links: Some(account.links()),
            properties: None,
        }
    }

    /// Non-mutating projection to a relationship subset
    pub fn with_filtered_links(&self, relationships: &[String]) -> ProfileRecord {
        if relationships.is_empty() {
            return self.clone();
        }

        ProfileRecord {
            links: self
                .links
                .as_ref()
                .map(|links| filter_links(links, relationships)),
            ..self.clone()
        }
    }
}

/// One entry of the persisted account-to-locator mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLocators {
    pub account: Account,
    #[serde(default)]
    pub locators: Vec<String>,
}

/// Lookup filter: by id, by locator, or by locator with a relationship
/// subset. Id takes precedence when both are set.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub id: i64,
    pub locator: Option<String>,
    pub relationships: Vec<String>,
}

impl RecordFilter {
    pub fn by_id(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn by_locator(locator: impl Into<String>) -> Self {
        Self {
            locator: Some(locator.into()),
            ..Default::default()
        }
    }

    pub fn with_relationships(mut self, relationships: Vec<String>) -> Self {
        self.relationships = relationships;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_person() -> Person {
        Person {
            id: 0,
            name: "Matt Test".to_string(),
            email: "mtest@test.com".to_string(),
            locators: BTreeSet::from(["acct:tester@thetest.com".to_string()]),
            aliases: BTreeSet::new(),
            links: Account::new("test.social", "tester").links(),
            account: Account::new("test.social", "tester"),
        }
    }

    #[test]
    fn test_account_key_is_deterministic() {
        let account = Account::new("test.social", "tester");
        assert_eq!(account.key(), "test_dot_social_tester");
        assert_eq!(account.key(), Account::new("test.social", "tester").key());
    }

    #[test]
    fn test_account_subject_and_aliases() {
        let account = Account::new("test.social", "tester");
        assert_eq!(account.subject(), "acct:tester@test.social");
        assert_eq!(
            account.aliases(),
            vec![
                "https://test.social/@tester".to_string(),
                "https://test.social/users/tester".to_string(),
            ]
        );
    }

    #[test]
    fn test_generated_links() {
        let links = Account::new("test.social", "tester").links();
        assert_eq!(links.len(), 3);

        assert_eq!(links[0].rel, rel::PROFILE_PAGE);
        assert_eq!(links[0].media_type.as_deref(), Some(media_type::HTML));
        assert_eq!(links[0].href.as_deref(), Some("https://test.social/@tester"));

        assert_eq!(links[1].rel, rel::SELF);
        assert_eq!(
            links[1].media_type.as_deref(),
            Some(media_type::ACTIVITY_JSON)
        );
        assert_eq!(
            links[1].href.as_deref(),
            Some("https://test.social/users/tester")
        );

        assert_eq!(links[2].rel, rel::SUBSCRIBE);
        assert_eq!(
            links[2].template.as_deref(),
            Some("https://test.social/authorize_interaction?uri={uri}")
        );
        assert!(links[2].href.is_none());
    }

    #[test]
    fn test_normalize_locator() {
        assert_eq!(normalize_locator("user@host.com"), "acct:user@host.com");
        assert_eq!(normalize_locator("acct:user@host.com"), "acct:user@host.com");
        assert_eq!(normalize_locator("ACCT:user@host.com"), "ACCT:user@host.com");
    }

    #[test]
    fn test_normalize_locator_handles_multibyte_input() {
        // a multibyte character straddling the scheme-length boundary must
        // not fault the check
        assert_eq!(normalize_locator("aaaaé@host"), "acct:aaaaé@host");
        assert_eq!(normalize_locator("é"), "acct:é");
        assert_eq!(normalize_locator(""), "acct:");
        assert_eq!(
            normalize_locator("acct:ünïcode@host"),
            "acct:ünïcode@host"
        );
    }

    #[test]
    fn test_filtered_links_keeps_only_requested_rels() {
        let person = test_person();
        let filtered = person.with_filtered_links(&[rel::SELF.to_string()]);

        assert_eq!(filtered.links.len(), 1);
        assert_eq!(filtered.links[0].rel, rel::SELF);
        assert_eq!(
            filtered.links[0].href.as_deref(),
            Some("https://test.social/users/tester")
        );
        // identity fields untouched
        assert_eq!(filtered.name, person.name);
        assert_eq!(filtered.locators, person.locators);
    }

    #[test]
    fn test_empty_filter_returns_record_unchanged() {
        let person = test_person();
        let unfiltered = person.with_filtered_links(&[]);
        assert_eq!(unfiltered, person);
        assert_eq!(unfiltered.links.len(), 3);
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let mut person = test_person();
        person.name = String::new();
        assert!(person.validate().is_err());

        let mut person = test_person();
        person.account.handle = "  ".to_string();
        assert!(person.validate().is_err());

        assert!(test_person().validate().is_ok());
    }

    #[test]
    fn test_link_serialization_skips_absent_fields() {
        let link = Link::with_template(rel::SUBSCRIBE, "https://x/{uri}".to_string());
        let json = serde_json::to_value(&link).unwrap();

        assert_eq!(json["rel"], rel::SUBSCRIBE);
        assert!(json.get("href").is_none());
        assert!(json.get("type").is_none());
        assert!(json.get("titles").is_none());
    }

    #[test]
    fn test_profile_record_for_account() {
        let record = ProfileRecord::for_account(&Account::new("test.social", "tester"));
        assert_eq!(record.subject, "acct:tester@test.social");
        assert_eq!(record.aliases.as_ref().map(|a| a.len()), Some(2));
        assert_eq!(record.links.as_ref().map(|l| l.len()), Some(3));
    }
}
