use crate::MAX_CREATE_ATTEMPTS;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use stubby_core::repository::{
    CreatedLink, Link, LinkRepository, Result, UserLink, UserLinkRepository,
};
use stubby_core::{DeleteRequest, ShortId, StorageError, UserId};
use tracing::debug;

#[derive(Debug)]
struct UserLinkRow {
    id: i64,
    user_id: UserId,
    link_id: i64,
}

/// Both tables plus the indexes standing in for their unique constraints.
///
/// Link ids are `position + 1`, so `links[id - 1]` is the row for `id`.
#[derive(Debug, Default)]
struct Tables {
    links: Vec<Link>,
    by_url: HashMap<String, usize>,
    by_short_id: HashMap<ShortId, usize>,
    user_links: Vec<UserLinkRow>,
    ownership: HashSet<(UserId, i64)>,
}

impl Tables {
    fn next_counter(&self) -> i64 {
        self.links.len() as i64 + 1
    }

    fn find_by_url(&self, original_url: &str) -> Option<&Link> {
        self.by_url.get(original_url).map(|&idx| &self.links[idx])
    }

    fn link(&self, link_id: i64) -> Option<&Link> {
        usize::try_from(link_id - 1)
            .ok()
            .and_then(|idx| self.links.get(idx))
    }

    fn insert_link(&mut self, short_id: ShortId, original_url: &str) -> Link {
        let idx = self.links.len();
        let link = Link {
            id: idx as i64 + 1,
            short_id: short_id.clone(),
            original_url: original_url.to_owned(),
            is_deleted: false,
        };

        self.links.push(link.clone());
        self.by_url.insert(original_url.to_owned(), idx);
        self.by_short_id.insert(short_id, idx);
        link
    }

    /// Inserts under the first free id starting at `candidate + bump`.
    fn insert_derived(&mut self, original_url: &str, candidate: i64, bump: &mut i64) -> Result<Link> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let short_id = ShortId::from_counter(candidate + *bump);
            if !self.by_short_id.contains_key(&short_id) {
                return Ok(self.insert_link(short_id, original_url));
            }

            debug!(short_id = %short_id, "derived short id already taken");
            *bump += 1;
        }

        Err(StorageError::Conflict(format!(
            "no free short id for '{}' after {} attempts",
            original_url, MAX_CREATE_ATTEMPTS
        )))
    }

    /// Drops every link stored at or after position `len`, with its index
    /// entries.
    fn truncate_links(&mut self, len: usize) {
        for link in self.links.drain(len..) {
            self.by_url.remove(&link.original_url);
            self.by_short_id.remove(&link.short_id);
        }
    }

    fn user_link(&self, row: &UserLinkRow) -> Result<UserLink> {
        let link = self.link(row.link_id).ok_or_else(|| {
            StorageError::InvalidData(format!("dangling user link to {}", row.link_id))
        })?;

        Ok(UserLink {
            id: row.id,
            user_id: row.user_id,
            link: link.clone(),
        })
    }
}

/// In-memory implementation of both repository contracts.
///
/// A single mutex guards both tables so that every operation, batches
/// included, is atomic with respect to the others. Nothing is held across an
/// `.await`.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    /// Creates a new, empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkRepository for InMemoryRepository {
    async fn create_link(
        &self,
        short_id: Option<&ShortId>,
        original_url: &str,
    ) -> Result<CreatedLink> {
        let mut tables = self.tables.lock();

        if let Some(existing) = tables.find_by_url(original_url) {
            let conflict = match short_id {
                Some(requested) => existing.short_id != *requested,
                None => true,
            };
            return Ok(CreatedLink {
                link: existing.clone(),
                conflict,
            });
        }

        let link = match short_id {
            Some(requested) => {
                if tables.by_short_id.contains_key(requested) {
                    return Err(StorageError::Conflict(requested.to_string()));
                }
                tables.insert_link(requested.clone(), original_url)
            }
            None => {
                let candidate = tables.next_counter();
                tables.insert_derived(original_url, candidate, &mut 0)?
            }
        };

        Ok(CreatedLink {
            link,
            conflict: false,
        })
    }

    async fn create_batch(&self, original_urls: &[String]) -> Result<Vec<Link>> {
        let mut tables = self.tables.lock();

        let start = tables.links.len();
        let base = tables.next_counter();
        let mut bump = 0;
        let mut links = Vec::with_capacity(original_urls.len());

        for (position, original_url) in original_urls.iter().enumerate() {
            let link = match tables.find_by_url(original_url) {
                Some(existing) => existing.clone(),
                None => {
                    let candidate = base + position as i64;
                    match tables.insert_derived(original_url, candidate, &mut bump) {
                        Ok(link) => link,
                        Err(err) => {
                            // Rows are only ever appended, so this undoes the batch.
                            tables.truncate_links(start);
                            return Err(err);
                        }
                    }
                }
            };
            links.push(link);
        }

        Ok(links)
    }

    async fn find_by_short_id(&self, short_id: &ShortId) -> Result<Option<Link>> {
        let tables = self.tables.lock();
        Ok(tables
            .by_short_id
            .get(short_id)
            .map(|&idx| tables.links[idx].clone()))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl UserLinkRepository for InMemoryRepository {
    async fn create_user_link(&self, user_id: &UserId, link_id: i64) -> Result<()> {
        let mut tables = self.tables.lock();

        if tables.link(link_id).is_none() {
            return Err(StorageError::Query(format!("link {} does not exist", link_id)));
        }

        if tables.ownership.insert((*user_id, link_id)) {
            let id = tables.user_links.len() as i64 + 1;
            tables.user_links.push(UserLinkRow {
                id,
                user_id: *user_id,
                link_id,
            });
        }

        Ok(())
    }

    async fn find_by_link_id(&self, user_id: &UserId, link_id: i64) -> Result<Option<UserLink>> {
        let tables = self.tables.lock();
        tables
            .user_links
            .iter()
            .find(|row| row.user_id == *user_id && row.link_id == link_id)
            .map(|row| tables.user_link(row))
            .transpose()
    }

    async fn list_user_links(&self, user_id: &UserId) -> Result<Vec<UserLink>> {
        let tables = self.tables.lock();
        tables
            .user_links
            .iter()
            .filter(|row| row.user_id == *user_id)
            .map(|row| tables.user_link(row))
            .collect()
    }

    async fn delete_links(&self, requests: &[DeleteRequest]) -> Result<u64> {
        let mut tables = self.tables.lock();
        let mut targets = HashSet::new();

        for request in requests {
            for short_id in &request.short_ids {
                let Some(&idx) = tables.by_short_id.get(short_id) else {
                    continue;
                };
                let link_id = tables.links[idx].id;
                if tables.ownership.contains(&(request.user_id, link_id)) {
                    targets.insert(idx);
                }
            }
        }

        for &idx in &targets {
            tables.links[idx].is_deleted = true;
        }

        Ok(targets.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn short(id: &str) -> ShortId {
        ShortId::new_unchecked(id)
    }

    fn urls(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn first_link_gets_id_one() {
        let repo = InMemoryRepository::new();

        let created = repo.create_link(None, "https://google.com").await.unwrap();
        assert_eq!(created.link.short_id.as_str(), "1");
        assert_eq!(created.link.original_url, "https://google.com");
        assert!(!created.conflict);
        assert!(!created.link.is_deleted);
    }

    #[tokio::test]
    async fn same_url_returns_existing_with_conflict() {
        let repo = InMemoryRepository::new();

        let first = repo.create_link(None, "https://google.com").await.unwrap();
        let second = repo.create_link(None, "https://google.com").await.unwrap();

        assert_eq!(first.link, second.link);
        assert!(second.conflict);
    }

    #[tokio::test]
    async fn explicit_short_id_is_used() {
        let repo = InMemoryRepository::new();

        let created = repo
            .create_link(Some(&short("custom")), "https://example.com")
            .await
            .unwrap();
        assert_eq!(created.link.short_id.as_str(), "custom");
        assert!(!created.conflict);

        let again = repo
            .create_link(Some(&short("custom")), "https://example.com")
            .await
            .unwrap();
        assert!(!again.conflict);
    }

    #[tokio::test]
    async fn explicit_short_id_taken_by_other_url_fails() {
        let repo = InMemoryRepository::new();

        repo.create_link(Some(&short("custom")), "https://one.example")
            .await
            .unwrap();
        let err = repo
            .create_link(Some(&short("custom")), "https://two.example")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn derived_id_skips_taken_ids() {
        let repo = InMemoryRepository::new();

        // "2" is taken explicitly, so the next derived id must move past it.
        repo.create_link(Some(&short("2")), "https://one.example")
            .await
            .unwrap();
        let created = repo.create_link(None, "https://two.example").await.unwrap();

        assert_eq!(created.link.short_id.as_str(), "3");
        assert!(!created.conflict);
    }

    #[tokio::test]
    async fn batch_assigns_increasing_ids_in_order() {
        let repo = InMemoryRepository::new();

        let links = repo
            .create_batch(&urls(&["https://a.com", "https://b.com"]))
            .await
            .unwrap();

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].short_id.as_str(), "1");
        assert_eq!(links[1].short_id.as_str(), "2");
        assert_eq!(links[0].original_url, "https://a.com");
        assert_eq!(links[1].original_url, "https://b.com");
    }

    #[tokio::test]
    async fn batch_reuses_existing_links() {
        let repo = InMemoryRepository::new();
        let existing = repo.create_link(None, "https://a.com").await.unwrap().link;

        let links = repo
            .create_batch(&urls(&["https://b.com", "https://a.com", "https://b.com"]))
            .await
            .unwrap();

        assert_eq!(links[1], existing);
        assert_eq!(links[0], links[2]);
        assert_ne!(links[0].short_id, existing.short_id);
    }

    #[tokio::test]
    async fn empty_batch_is_noop() {
        let repo = InMemoryRepository::new();

        assert!(repo.create_batch(&[]).await.unwrap().is_empty());
        let created = repo.create_link(None, "https://a.com").await.unwrap();
        assert_eq!(created.link.short_id.as_str(), "1");
    }

    #[tokio::test]
    async fn find_by_short_id() {
        let repo = InMemoryRepository::new();
        let created = repo.create_link(None, "https://a.com").await.unwrap().link;

        assert_eq!(repo.find_by_short_id(&short("1")).await.unwrap(), Some(created));
        assert_eq!(repo.find_by_short_id(&short("404")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn user_links_are_unique_per_pair() {
        let repo = InMemoryRepository::new();
        let user = UserId::new();
        let link = repo.create_link(None, "https://a.com").await.unwrap().link;

        repo.create_user_link(&user, link.id).await.unwrap();
        repo.create_user_link(&user, link.id).await.unwrap();

        let listed = repo.list_user_links(&user).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].link, link);
        assert_eq!(listed[0].user_id, user);

        let found = repo.find_by_link_id(&user, link.id).await.unwrap().unwrap();
        assert_eq!(found, listed[0]);
        assert!(repo
            .find_by_link_id(&UserId::new(), link.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn user_link_to_missing_link_fails() {
        let repo = InMemoryRepository::new();

        let err = repo.create_user_link(&UserId::new(), 42).await.unwrap_err();
        assert!(matches!(err, StorageError::Query(_)));
    }

    #[tokio::test]
    async fn delete_links_only_touches_owned_links() {
        let repo = InMemoryRepository::new();
        let alice = UserId::new();
        let bob = UserId::new();

        let a = repo.create_link(None, "https://a.com").await.unwrap().link;
        let b = repo.create_link(None, "https://b.com").await.unwrap().link;
        let c = repo.create_link(None, "https://c.com").await.unwrap().link;
        repo.create_user_link(&alice, a.id).await.unwrap();
        repo.create_user_link(&alice, b.id).await.unwrap();
        repo.create_user_link(&bob, c.id).await.unwrap();

        let updated = repo
            .delete_links(&[
                DeleteRequest::new(alice, vec![a.short_id.clone(), c.short_id.clone()]),
                DeleteRequest::new(bob, vec![c.short_id.clone(), short("404")]),
            ])
            .await
            .unwrap();

        assert_eq!(updated, 2);
        assert!(repo.find_by_short_id(&a.short_id).await.unwrap().unwrap().is_deleted);
        assert!(!repo.find_by_short_id(&b.short_id).await.unwrap().unwrap().is_deleted);
        assert!(repo.find_by_short_id(&c.short_id).await.unwrap().unwrap().is_deleted);
    }

    #[tokio::test]
    async fn concurrent_creates_converge_on_one_row() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut handles = vec![];

        for _ in 0..16 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.create_link(None, "https://same.example").await.unwrap()
            }));
        }

        let mut fresh = 0;
        let mut short_ids = HashSet::new();
        for handle in handles {
            let created = handle.await.unwrap();
            short_ids.insert(created.link.short_id);
            if !created.conflict {
                fresh += 1;
            }
        }

        assert_eq!(short_ids.len(), 1);
        assert_eq!(fresh, 1);
    }

    #[tokio::test]
    async fn failed_batch_leaves_nothing_behind() {
        let repo = InMemoryRepository::new();
        for id in 7..=11 {
            repo.create_link(Some(&short(&id.to_string())), &format!("https://taken{id}.com"))
                .await
                .unwrap();
        }

        let err = repo
            .create_batch(&urls(&["https://first.com", "https://second.com"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        // "6" was handed to the first URL before the second ran out of ids.
        assert!(repo.find_by_short_id(&short("6")).await.unwrap().is_none());

        let created = repo.create_link(None, "https://first.com").await.unwrap();
        assert!(!created.conflict);
        assert_eq!(created.link.id, 6);
        assert_eq!(created.link.short_id.as_str(), "6");
    }
}
