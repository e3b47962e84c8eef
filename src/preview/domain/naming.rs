//! Deterministic naming for preview environments.

use super::{
    ApplicationName, CommitSha, Namespace, PreviewDomainError, PullRequestNumber,
    RepositoryFullName,
};

/// Image tag used when a pull request has no known head commit.
pub const FALLBACK_IMAGE_TAG: &str = "latest";

/// Names derived for one pull request's preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewNames {
    /// Controller application name, `{prefix}-pr-{N}`.
    pub app_name: ApplicationName,
    /// Namespace, `pr-{N}`.
    pub namespace: Namespace,
    /// Public host, `{app_name}.{preview_domain}`.
    pub host: String,
    /// Public URL, `https://{host}`.
    pub url: String,
}

/// Derives preview names from a pull request number.
///
/// # Examples
///
/// ```
/// use snapenv::preview::domain::{PreviewNaming, PullRequestNumber};
///
/// let naming = PreviewNaming::new("snapenv", "preview.example.com");
/// let names = naming.names_for(PullRequestNumber::new(42)?)?;
/// assert_eq!(names.app_name.as_str(), "snapenv-pr-42");
/// assert_eq!(names.namespace.as_str(), "pr-42");
/// assert_eq!(names.url, "https://snapenv-pr-42.preview.example.com");
/// # Ok::<(), snapenv::preview::domain::PreviewDomainError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewNaming {
    app_prefix: String,
    preview_domain: String,
}

impl PreviewNaming {
    /// Creates a naming scheme.
    #[must_use]
    pub fn new(app_prefix: impl Into<String>, preview_domain: impl Into<String>) -> Self {
        Self {
            app_prefix: app_prefix.into(),
            preview_domain: preview_domain.into(),
        }
    }

    /// Returns the names for the given pull request.
    ///
    /// # Errors
    ///
    /// Returns a [`PreviewDomainError`] when the configured prefix produces an
    /// invalid application name.
    pub fn names_for(&self, number: PullRequestNumber) -> Result<PreviewNames, PreviewDomainError> {
        let app_name = ApplicationName::new(format!("{}-pr-{number}", self.app_prefix))?;
        let namespace = Namespace::new(format!("pr-{number}"))?;
        let host = format!("{app_name}.{}", self.preview_domain);
        let url = format!("https://{host}");
        Ok(PreviewNames {
            app_name,
            namespace,
            host,
            url,
        })
    }

    /// Returns the image tag for a head commit.
    #[must_use]
    pub fn image_tag(commit_sha: Option<&CommitSha>) -> String {
        commit_sha.map_or_else(|| FALLBACK_IMAGE_TAG.to_owned(), CommitSha::short)
    }

    /// Returns the clone URL for a repository.
    #[must_use]
    pub fn repo_url(repository: &RepositoryFullName) -> String {
        format!("https://github.com/{repository}.git")
    }
}
