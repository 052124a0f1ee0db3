use crate::config::ShortenerConfig;
use crate::daemon::DeletionQueue;
use crate::error::{Result, ShortenerError};
use crate::shortener::{Identity, Shortened, Shortener, UserUrl};
use async_trait::async_trait;
use std::sync::Arc;
use stubby_core::{DeleteRequest, Link, Repository, ShortId, UserId};
use stubby_session::SessionCodec;
use tracing::{debug, trace, warn};
use url::Url;

/// A concrete implementation of the `Shortener` trait.
///
/// Wraps a storage backend serving both the link table and the ownership
/// index, the session codec and the producer side of the deletion queue.
/// Deduplication is left to the backend's uniqueness constraints: no lock is
/// held here across storage calls.
pub struct ShortenerService<R> {
    repository: Arc<R>,
    sessions: SessionCodec,
    deletions: DeletionQueue,
    config: ShortenerConfig,
}

impl<R: Repository> ShortenerService<R> {
    pub fn new(
        repository: Arc<R>,
        sessions: SessionCodec,
        deletions: DeletionQueue,
        config: ShortenerConfig,
    ) -> Self {
        Self {
            repository,
            sessions,
            deletions,
            config,
        }
    }

    /// Accepts only absolute URLs with a hierarchical part, e.g. `https://host/...`.
    ///
    /// The URL is stored as given and later served back as a `Location`
    /// header, so it must be visible ASCII. The parser would otherwise strip
    /// tabs and newlines and accept input that can never be redirected to.
    fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        if let Some(c) = url.chars().find(|c| !c.is_ascii_graphic()) {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL contains a disallowed character {c:?}: {url:?}"
            )));
        }

        let parsed = Url::parse(url)
            .map_err(|e| ShortenerError::InvalidUrl(format!("{url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must be absolute: {url}"
            )));
        }

        Ok(())
    }

    fn short_url(&self, short_id: &ShortId) -> String {
        short_id.to_url(&self.config.base_url)
    }

    async fn ensure_owned(&self, user_id: &UserId, link: &Link) -> Result<()> {
        if self
            .repository
            .find_by_link_id(user_id, link.id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        self.repository.create_user_link(user_id, link.id).await?;
        debug!(user_id = %user_id, short_id = %link.short_id, "associated link with user");
        Ok(())
    }
}

#[async_trait]
impl<R: Repository> Shortener for ShortenerService<R> {
    fn identify(&self, token: Option<&str>) -> Result<Identity> {
        if let Some(token) = token {
            match self.sessions.decode(token) {
                Ok(user_id) => {
                    return Ok(Identity {
                        user_id,
                        issued_token: None,
                    })
                }
                Err(err) => debug!(error = %err, "rejected session token"),
            }
        }

        let user_id = UserId::new();
        let token = self.sessions.encode(&user_id)?;
        debug!(user_id = %user_id, "issued new session");
        Ok(Identity {
            user_id,
            issued_token: Some(token),
        })
    }

    async fn make_shorter(
        &self,
        original_url: &str,
        user_id: Option<&UserId>,
    ) -> Result<Shortened> {
        Self::validate_url(original_url)?;

        let created = self.repository.create_link(None, original_url).await?;
        trace!(
            short_id = %created.link.short_id,
            conflict = created.conflict,
            "resolved link"
        );

        if let Some(user_id) = user_id {
            self.ensure_owned(user_id, &created.link).await?;
        }

        Ok(Shortened {
            short_url: self.short_url(&created.link.short_id),
            conflict: created.conflict,
        })
    }

    async fn make_shorter_batch(&self, original_urls: &[String]) -> Result<Vec<String>> {
        for url in original_urls {
            Self::validate_url(url)?;
        }

        let links = self.repository.create_batch(original_urls).await?;
        debug!(count = links.len(), "resolved link batch");
        Ok(links
            .iter()
            .map(|link| self.short_url(&link.short_id))
            .collect())
    }

    async fn restore_long(&self, short_id: &ShortId) -> Result<String> {
        let link = self
            .repository
            .find_by_short_id(short_id)
            .await?
            .ok_or_else(|| ShortenerError::NotFound(short_id.to_string()))?;

        if link.is_deleted {
            return Err(ShortenerError::Gone {
                short_id: link.short_id.into_inner(),
                original_url: link.original_url,
            });
        }

        Ok(link.original_url)
    }

    async fn get_user_links(&self, user_id: Option<&UserId>) -> Result<Vec<UserUrl>> {
        let Some(user_id) = user_id else {
            return Ok(vec![]);
        };

        let links = self.repository.list_user_links(user_id).await?;
        Ok(links
            .into_iter()
            .map(|user_link| UserUrl {
                short_url: self.short_url(&user_link.link.short_id),
                original_url: user_link.link.original_url,
            })
            .collect())
    }

    fn delete_urls(&self, user_id: UserId, short_ids: Vec<ShortId>) -> bool {
        let count = short_ids.len();
        let queued = self.deletions.enqueue(DeleteRequest::new(user_id, short_ids));
        if queued {
            debug!(user_id = %user_id, short_ids = count, "queued deletion");
        }
        queued
    }

    async fn is_storage_available(&self) -> bool {
        match tokio::time::timeout(self.config.storage_probe_timeout, self.repository.ping()).await
        {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(error = %err, "storage ping failed");
                false
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.storage_probe_timeout.as_millis() as u64,
                    "storage ping timed out"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeletionConfig;
    use crate::daemon::DeletionDaemon;
    use std::collections::HashSet;
    use std::time::Duration;
    use stubby_core::repository::Result as StorageResult;
    use stubby_core::{
        CreatedLink, LinkRepository, StorageError, UserLink, UserLinkRepository,
    };
    use stubby_storage::InMemoryRepository;

    const BASE_URL: &str = "http://localhost:8080";
    const SECRET: &[u8] = b"0123456789abcdef";

    fn service_with<R: Repository>(
        repository: R,
    ) -> (ShortenerService<R>, DeletionDaemon<R>) {
        let repository = Arc::new(repository);
        let (daemon, queue) = DeletionDaemon::new(Arc::clone(&repository), DeletionConfig::default());
        let service = ShortenerService::new(
            repository,
            SessionCodec::new(SECRET).unwrap(),
            queue,
            ShortenerConfig::builder().base_url(BASE_URL).build(),
        );
        (service, daemon)
    }

    fn test_service() -> (
        ShortenerService<InMemoryRepository>,
        DeletionDaemon<InMemoryRepository>,
    ) {
        service_with(InMemoryRepository::new())
    }

    fn short_id_of(short_url: &str) -> ShortId {
        let id = short_url.rsplit('/').next().unwrap();
        ShortId::new(id).unwrap()
    }

    #[tokio::test]
    async fn first_url_gets_counter_one_then_conflicts() {
        let (service, _daemon) = test_service();

        let first = service
            .make_shorter("https://google.com", None)
            .await
            .unwrap();
        assert_eq!(first.short_url, "http://localhost:8080/1");
        assert!(!first.conflict);

        let second = service
            .make_shorter("https://google.com", None)
            .await
            .unwrap();
        assert_eq!(second.short_url, first.short_url);
        assert!(second.conflict);
    }

    #[tokio::test]
    async fn malformed_urls_are_rejected() {
        let (service, _daemon) = test_service();

        for url in [
            "",
            "not a url",
            "google.com",
            "mailto:someone@example.com",
            "https://a.com/x\ny",
            "https://a.com/\tpath",
            "https://a.com/a b",
            "https://例え.jp/",
        ] {
            let err = service.make_shorter(url, None).await.unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "{url:?}");
        }
    }

    #[tokio::test]
    async fn batch_with_malformed_url_stores_nothing() {
        let (service, _daemon) = test_service();

        let urls = vec!["https://a.com".to_string(), "https://b.com/\n".to_string()];
        let err = service.make_shorter_batch(&urls).await.unwrap_err();
        assert!(matches!(err, ShortenerError::InvalidUrl(_)));

        let first = service.make_shorter("https://a.com", None).await.unwrap();
        assert!(!first.conflict);
    }

    #[tokio::test]
    async fn batch_returns_increasing_ids_in_order() {
        let (service, _daemon) = test_service();

        let urls = vec!["https://a.com".to_string(), "https://b.com".to_string()];
        let short_urls = service.make_shorter_batch(&urls).await.unwrap();

        assert_eq!(
            short_urls,
            vec!["http://localhost:8080/1", "http://localhost:8080/2"]
        );
    }

    #[tokio::test]
    async fn batch_reuses_existing_short_id() {
        let (service, _daemon) = test_service();
        let existing = service
            .make_shorter("https://a.com", None)
            .await
            .unwrap();

        let urls = vec!["https://b.com".to_string(), "https://a.com".to_string()];
        let short_urls = service.make_shorter_batch(&urls).await.unwrap();

        assert_eq!(short_urls[1], existing.short_url);
        assert_ne!(short_urls[0], existing.short_url);
    }

    #[tokio::test]
    async fn restore_long_round_trips() {
        let (service, _daemon) = test_service();
        let shortened = service
            .make_shorter("https://example.com/some/path?q=1", None)
            .await
            .unwrap();

        let original = service
            .restore_long(&short_id_of(&shortened.short_url))
            .await
            .unwrap();
        assert_eq!(original, "https://example.com/some/path?q=1");
    }

    #[tokio::test]
    async fn restore_long_unknown_id_is_not_found() {
        let (service, _daemon) = test_service();

        let err = service
            .restore_long(&ShortId::new("missing").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn deleted_link_is_gone_after_flush() {
        let (service, mut daemon) = test_service();
        let user = UserId::new();
        let shortened = service
            .make_shorter("https://a.com", Some(&user))
            .await
            .unwrap();
        let short_id = short_id_of(&shortened.short_url);

        assert!(service.delete_urls(user, vec![short_id.clone()]));
        assert_eq!(
            service.restore_long(&short_id).await.unwrap(),
            "https://a.com"
        );

        assert_eq!(daemon.flush().await, 1);

        let err = service.restore_long(&short_id).await.unwrap_err();
        match err {
            ShortenerError::Gone { original_url, .. } => assert_eq!(original_url, "https://a.com"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn users_cannot_delete_links_they_do_not_own() {
        let (service, mut daemon) = test_service();
        let owner = UserId::new();
        let shortened = service
            .make_shorter("https://a.com", Some(&owner))
            .await
            .unwrap();
        let short_id = short_id_of(&shortened.short_url);

        service.delete_urls(UserId::new(), vec![short_id.clone()]);
        daemon.flush().await;

        assert!(service.restore_long(&short_id).await.is_ok());
    }

    #[tokio::test]
    async fn empty_deletion_is_not_queued() {
        let (service, mut daemon) = test_service();

        assert!(!service.delete_urls(UserId::new(), vec![]));
        assert_eq!(daemon.flush().await, 0);
    }

    #[tokio::test]
    async fn user_links_have_no_duplicates() {
        let (service, _daemon) = test_service();
        let alice = UserId::new();
        let bob = UserId::new();

        service.make_shorter("https://a.com", Some(&alice)).await.unwrap();
        service.make_shorter("https://a.com", Some(&alice)).await.unwrap();
        service.make_shorter("https://b.com", Some(&alice)).await.unwrap();
        // Resolving an existing URL also grants ownership.
        service.make_shorter("https://a.com", Some(&bob)).await.unwrap();

        let alice_links = service.get_user_links(Some(&alice)).await.unwrap();
        assert_eq!(
            alice_links,
            vec![
                UserUrl {
                    short_url: "http://localhost:8080/1".to_string(),
                    original_url: "https://a.com".to_string(),
                },
                UserUrl {
                    short_url: "http://localhost:8080/2".to_string(),
                    original_url: "https://b.com".to_string(),
                },
            ]
        );

        let bob_links = service.get_user_links(Some(&bob)).await.unwrap();
        assert_eq!(bob_links.len(), 1);
        assert_eq!(bob_links[0].short_url, "http://localhost:8080/1");
    }

    #[tokio::test]
    async fn user_links_empty_without_user() {
        let (service, _daemon) = test_service();
        service
            .make_shorter("https://a.com", Some(&UserId::new()))
            .await
            .unwrap();

        assert!(service.get_user_links(None).await.unwrap().is_empty());
        assert!(service
            .get_user_links(Some(&UserId::new()))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn concurrent_shortening_converges() {
        let (service, _daemon) = test_service();
        let service = Arc::new(service);
        let mut handles = vec![];

        for _ in 0..16 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .make_shorter("https://same.example", Some(&UserId::new()))
                    .await
                    .unwrap()
            }));
        }

        let mut short_urls = HashSet::new();
        let mut fresh = 0;
        for handle in handles {
            let shortened = handle.await.unwrap();
            if !shortened.conflict {
                fresh += 1;
            }
            short_urls.insert(shortened.short_url);
        }

        assert_eq!(short_urls.len(), 1);
        assert_eq!(fresh, 1);
    }

    #[tokio::test]
    async fn identify_issues_token_when_absent_or_rejected() {
        let (service, _daemon) = test_service();

        let issued = service.identify(None).unwrap();
        let token = issued.issued_token.clone().unwrap();

        let resumed = service.identify(Some(&token)).unwrap();
        assert_eq!(resumed.user_id, issued.user_id);
        assert!(resumed.issued_token.is_none());

        for bad in ["", "garbage!", "AAAA"] {
            let fresh = service.identify(Some(bad)).unwrap();
            assert_ne!(fresh.user_id, issued.user_id);
            assert!(fresh.issued_token.is_some());
        }
    }

    #[tokio::test]
    async fn storage_available_with_in_memory_backend() {
        let (service, _daemon) = test_service();
        assert!(service.is_storage_available().await);
    }

    /// Backend whose every call fails or never completes.
    struct BrokenRepository {
        hang: bool,
    }

    impl BrokenRepository {
        async fn fail<T>(&self) -> StorageResult<T> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Err(StorageError::Unavailable("connection refused".to_string()))
        }
    }

    #[async_trait]
    impl LinkRepository for BrokenRepository {
        async fn create_link(
            &self,
            _short_id: Option<&ShortId>,
            _original_url: &str,
        ) -> StorageResult<CreatedLink> {
            self.fail().await
        }

        async fn create_batch(&self, _original_urls: &[String]) -> StorageResult<Vec<Link>> {
            self.fail().await
        }

        async fn find_by_short_id(&self, _short_id: &ShortId) -> StorageResult<Option<Link>> {
            self.fail().await
        }

        async fn ping(&self) -> StorageResult<()> {
            self.fail().await
        }
    }

    #[async_trait]
    impl UserLinkRepository for BrokenRepository {
        async fn create_user_link(&self, _user_id: &UserId, _link_id: i64) -> StorageResult<()> {
            self.fail().await
        }

        async fn find_by_link_id(
            &self,
            _user_id: &UserId,
            _link_id: i64,
        ) -> StorageResult<Option<UserLink>> {
            self.fail().await
        }

        async fn list_user_links(&self, _user_id: &UserId) -> StorageResult<Vec<UserLink>> {
            self.fail().await
        }

        async fn delete_links(&self, _requests: &[DeleteRequest]) -> StorageResult<u64> {
            self.fail().await
        }
    }

    #[tokio::test]
    async fn storage_errors_propagate() {
        let (service, _daemon) = service_with(BrokenRepository { hang: false });

        let err = service
            .make_shorter("https://a.com", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::Storage(StorageError::Unavailable(_))));

        let err = service
            .make_shorter_batch(&["https://a.com".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::Storage(_)));

        assert!(!service.is_storage_available().await);
    }

    #[tokio::test(start_paused = true)]
    async fn storage_probe_times_out() {
        let (service, _daemon) = service_with(BrokenRepository { hang: true });

        let started = tokio::time::Instant::now();
        assert!(!service.is_storage_available().await);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
