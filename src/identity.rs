//! # Identity
//!
//! Rider profile lookups used to enrich requests after they are queued.
//!
//! Lookups are best effort. A failure never blocks a request, it only
//! leaves the profile fields blank.
use std::{collections::HashMap, fs::File, path::Path, sync::Arc};

use futures_util::{future::BoxFuture, FutureExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum IdentityError {
    #[error("No profile for '{0}'")]
    NotFound(String),
    #[error("Identity service failed: {0}")]
    Service(String),
    #[error("Error reading directory '{path}': {message}")]
    Read { path: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub major: String,
    #[serde(default)]
    pub picture: String,
}

pub trait IdentityProvider: Send + Sync {
    fn find_by_identifier(&self, identifier: &str) -> BoxFuture<'static, Result<Profile, IdentityError>>;
}

/// Answers every lookup with `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct NoDirectory;

impl IdentityProvider for NoDirectory {
    fn find_by_identifier(&self, identifier: &str) -> BoxFuture<'static, Result<Profile, IdentityError>> {
        let identifier = identifier.to_string();
        async move { Err(IdentityError::NotFound(identifier)) }.boxed()
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryRecord {
    identifier: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    major: String,
    #[serde(default)]
    picture: String,
}

impl From<DirectoryRecord> for (String, Profile) {
    fn from(record: DirectoryRecord) -> Self {
        let profile = Profile {
            name: record.name,
            phone: record.phone,
            major: record.major,
            picture: record.picture,
        };
        (record.identifier, profile)
    }
}

/// In-memory profile directory.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    profiles: Arc<HashMap<String, Profile>>,
}

impl Directory {
    pub fn new(profiles: HashMap<String, Profile>) -> Self {
        Self {
            profiles: Arc::new(profiles),
        }
    }

    /// reads `identifier,name,phone,major,picture` rows
    pub fn from_csv(path: &Path) -> Result<Self, IdentityError> {
        let read_error = |message: String| IdentityError::Read {
            path: path.display().to_string(),
            message,
        };

        let file = File::open(path).map_err(|e| read_error(e.to_string()))?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut profiles = HashMap::new();
        for result in rdr.deserialize() {
            let record: DirectoryRecord = result.map_err(|e| read_error(e.to_string()))?;
            let (identifier, profile) = record.into();
            profiles.insert(identifier, profile);
        }

        Ok(Self::new(profiles))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl IdentityProvider for Directory {
    fn find_by_identifier(&self, identifier: &str) -> BoxFuture<'static, Result<Profile, IdentityError>> {
        let result = self
            .profiles
            .get(identifier)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(identifier.to_string()));

        async move { result }.boxed()
    }
}

/// Remote identity service answering `GET {base}/users/{identifier}` with a
/// JSON profile.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDirectory {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// the identifier always lands in one escaped path segment, slashes and
    /// query characters included.
    pub fn profile_url(&self, identifier: &str) -> Result<Url, IdentityError> {
        let invalid_base = || {
            IdentityError::Service(format!("invalid identity service url '{}'", self.base_url))
        };

        let mut url = Url::parse(&self.base_url).map_err(|_| invalid_base())?;
        url.path_segments_mut()
            .map_err(|_| invalid_base())?
            .pop_if_empty()
            .extend(["users", identifier]);

        Ok(url)
    }
}

impl IdentityProvider for HttpDirectory {
    fn find_by_identifier(&self, identifier: &str) -> BoxFuture<'static, Result<Profile, IdentityError>> {
        let client = self.client.clone();
        let url = self.profile_url(identifier);
        let identifier = identifier.to_string();

        async move {
            let response = client
                .get(url?)
                .send()
                .await
                .map_err(|e| IdentityError::Service(e.to_string()))?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(IdentityError::NotFound(identifier));
            }

            response
                .error_for_status()
                .map_err(|e| IdentityError::Service(e.to_string()))?
                .json::<Profile>()
                .await
                .map_err(|e| IdentityError::Service(e.to_string()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[tokio::test]
    async fn test_directory_lookup() {
        let directory = Directory::new(HashMap::from([(
            "a1@usb.ve".to_string(),
            Profile {
                name: "Ana".to_string(),
                ..Default::default()
            },
        )]));

        let profile = directory.find_by_identifier("a1@usb.ve").await.unwrap();
        assert_eq!(profile.name, "Ana");

        assert_eq!(
            directory.find_by_identifier("b2@usb.ve").await,
            Err(IdentityError::NotFound("b2@usb.ve".to_string()))
        );
    }

    #[tokio::test]
    async fn test_no_directory() {
        assert!(NoDirectory.find_by_identifier("a1@usb.ve").await.is_err());
    }

    #[test]
    fn test_directory_from_csv() {
        let path =
            std::env::temp_dir().join(format!("aventon-directory-{}.csv", std::process::id()));
        fs::write(
            &path,
            "identifier,name,phone,major,picture\na1@usb.ve,Ana,555-0100,Physics,ana.png\n",
        )
        .unwrap();

        let directory = Directory::from_csv(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.profiles["a1@usb.ve"].major, "Physics");
    }

    #[test]
    fn test_profile_url() {
        let directory = HttpDirectory::new("http://identity.local/");

        assert_eq!(
            directory.profile_url("a1@usb.ve").unwrap().as_str(),
            "http://identity.local/users/a1@usb.ve"
        );

        let nested = HttpDirectory::new("http://identity.local/api/");
        assert_eq!(
            nested.profile_url("a1@usb.ve").unwrap().path(),
            "/api/users/a1@usb.ve"
        );
    }

    #[test]
    fn test_profile_url_keeps_identifier_in_one_segment() {
        let directory = HttpDirectory::new("http://identity.local");

        let traversal = directory.profile_url("x/../victim@usb.ve").unwrap();
        assert_eq!(traversal.path(), "/users/x%2F..%2Fvictim@usb.ve");
        assert_eq!(traversal.path_segments().unwrap().count(), 2);

        let query = directory.profile_url("a?b@usb.ve").unwrap();
        assert_eq!(query.path(), "/users/a%3Fb@usb.ve");
        assert_eq!(query.query(), None);

        let fragment = directory.profile_url("a#b@usb.ve").unwrap();
        assert_eq!(fragment.path(), "/users/a%23b@usb.ve");
        assert_eq!(fragment.fragment(), None);
    }

    #[test]
    fn test_profile_url_bad_base() {
        let directory = HttpDirectory::new("not a url");

        assert!(matches!(
            directory.profile_url("a1@usb.ve"),
            Err(IdentityError::Service(_))
        ));
    }
}
