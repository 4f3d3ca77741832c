//! End-to-end tests over the file storage backend: durability across
//! restarts, quarantine behavior, and the full account-publication flow.

use fingerpost::{
    model::{media_type, rel, Account, Person, RecordFilter},
    service::{DirectoryService, UpsertProfileRequest},
    store::{FileBackend, PersistenceBackend, RecordStore},
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn test_person(name: &str, handle: &str, locator: &str) -> Person {
    let account = Account::new("test.social", handle);
    Person {
        id: 0,
        name: name.to_string(),
        email: format!("{}@test.com", handle),
        locators: BTreeSet::from([locator.to_string()]),
        aliases: account.aliases().into_iter().collect(),
        links: account.links(),
        account,
    }
}

async fn open_store(root: &Path) -> RecordStore {
    RecordStore::open(Arc::new(FileBackend::new(root.to_path_buf())))
        .await
        .unwrap()
}

#[tokio::test]
async fn record_store_state_survives_restart() {
    let dir = tempdir().unwrap();

    let inserted = {
        let store = open_store(dir.path()).await;
        store
            .insert(test_person("Matt Test", "tester", "acct:tester@thetest.com"))
            .await
            .unwrap()
    };

    let reopened = open_store(dir.path()).await;
    let fetched = reopened
        .get(&RecordFilter::by_locator("acct:tester@thetest.com"))
        .unwrap();

    assert_eq!(fetched, inserted);
    assert_eq!(reopened.list_all().len(), 1);
}

#[tokio::test]
async fn corrupt_unit_does_not_block_directory_load() {
    let dir = tempdir().unwrap();

    {
        let store = open_store(dir.path()).await;
        for (name, handle, locator) in [
            ("Matt Test", "tester", "acct:tester@thetest.com"),
            ("Jo Test", "jo", "acct:jo@thetest.com"),
            ("Sam Test", "sam", "acct:sam@thetest.com"),
        ] {
            store.insert(test_person(name, handle, locator)).await.unwrap();
        }
    }

    let people_dir = dir.path().join("people");
    std::fs::write(people_dir.join("99.json"), b"{ definitely not json").unwrap();

    // load succeeds, indexes exactly the valid records
    let store = open_store(dir.path()).await;
    assert_eq!(store.list_all().len(), 3);

    // the corrupt unit was moved aside, not deleted
    assert!(!people_dir.join("99.json").exists());
    assert!(people_dir.join("fault").join("99.json").exists());
}

#[tokio::test]
async fn update_and_delete_are_durable() {
    let dir = tempdir().unwrap();

    let (kept, dropped) = {
        let store = open_store(dir.path()).await;
        let kept = store
            .insert(test_person("Matt Test", "tester", "acct:tester@thetest.com"))
            .await
            .unwrap();
        let dropped = store
            .insert(test_person("Jo Test", "jo", "acct:jo@thetest.com"))
            .await
            .unwrap();

        let mut renamed = kept.clone();
        renamed.locators = BTreeSet::from(["acct:renamed@thetest.com".to_string()]);
        store.update(renamed).await.unwrap();

        assert!(store.delete(&dropped).await.unwrap());
        (kept, dropped)
    };

    let store = open_store(dir.path()).await;
    assert!(store.get(&RecordFilter::by_id(dropped.id)).is_none());
    assert!(store
        .get(&RecordFilter::by_locator("acct:tester@thetest.com"))
        .is_none());

    let found = store
        .get(&RecordFilter::by_locator("acct:renamed@thetest.com"))
        .unwrap();
    assert_eq!(found.id, kept.id);
}

#[tokio::test]
async fn duplicate_locator_insert_leaves_no_unit_on_disk() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path()).await;

    let first = store
        .insert(test_person("Matt Test", "tester", "acct:tester@thetest.com"))
        .await
        .unwrap();
    let second = store
        .insert(test_person("Imposter", "imposter", "acct:tester@thetest.com"))
        .await;

    assert!(second.is_err());

    let people_dir = dir.path().join("people");
    assert!(people_dir.join(format!("{}.json", first.id)).exists());

    let unit_count = std::fs::read_dir(&people_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "json").unwrap_or(false))
        .count();
    assert_eq!(unit_count, 1);
}

#[tokio::test]
async fn published_account_resolves_with_canonical_links() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(FileBackend::new(dir.path().to_path_buf()));
    let service = DirectoryService::open(backend.clone()).await.unwrap();

    let record = service
        .add(UpsertProfileRequest {
            account: Account::new("test.social", "tester"),
            locators: vec!["tester@thetest.com".to_string()],
        })
        .await
        .unwrap();

    assert_eq!(record.subject, "acct:tester@test.social");
    assert_eq!(
        record.aliases,
        Some(vec![
            "https://test.social/@tester".to_string(),
            "https://test.social/users/tester".to_string(),
        ])
    );

    let links = record.links.clone().unwrap();
    assert_eq!(links.len(), 3);
    assert_eq!(links[0].rel, rel::PROFILE_PAGE);
    assert_eq!(links[0].media_type.as_deref(), Some(media_type::HTML));
    assert_eq!(links[1].rel, rel::SELF);
    assert_eq!(
        links[1].media_type.as_deref(),
        Some(media_type::ACTIVITY_JSON)
    );
    assert_eq!(links[2].rel, rel::SUBSCRIBE);
    assert_eq!(
        links[2].template.as_deref(),
        Some("https://test.social/authorize_interaction?uri={uri}")
    );

    // lookup by the acct: form of the requested locator returns that record
    let found = service
        .lookup("acct:tester@thetest.com", &[])
        .await
        .unwrap();
    assert_eq!(found, Some(record));

    // the mapping file reflects the normalized locator set
    let mapping = backend.load_mapping().await.unwrap();
    assert_eq!(mapping.len(), 1);
    assert_eq!(
        mapping[0].locators,
        vec!["acct:tester@thetest.com".to_string()]
    );
}

#[tokio::test]
async fn directory_service_survives_restart() {
    let dir = tempdir().unwrap();

    {
        let backend = Arc::new(FileBackend::new(dir.path().to_path_buf()));
        let service = DirectoryService::open(backend).await.unwrap();
        service
            .add(UpsertProfileRequest {
                account: Account::new("test.social", "tester"),
                locators: vec!["tester@thetest.com".to_string()],
            })
            .await
            .unwrap();
    }

    let backend = Arc::new(FileBackend::new(dir.path().to_path_buf()));
    let service = DirectoryService::open(backend).await.unwrap();

    let found = service
        .lookup("acct:tester@thetest.com", &[rel::SELF.to_string()])
        .await
        .unwrap()
        .unwrap();

    let links = found.links.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(
        links[0].href.as_deref(),
        Some("https://test.social/users/tester")
    );
}

#[tokio::test]
async fn record_store_and_directory_share_one_backend() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(FileBackend::new(dir.path().to_path_buf()));

    let store = RecordStore::open(backend.clone()).await.unwrap();
    let service = DirectoryService::open(backend).await.unwrap();

    store
        .insert(test_person("Matt Test", "tester", "acct:tester@thetest.com"))
        .await
        .unwrap();
    service
        .add(UpsertProfileRequest {
            account: Account::new("test.social", "tester"),
            locators: vec!["tester@thetest.com".to_string()],
        })
        .await
        .unwrap();

    // person units and profile units live in separate directories
    assert!(dir.path().join("people").join("1.json").exists());
    assert!(dir
        .path()
        .join("webfinger")
        .join("test_dot_social_tester.json")
        .exists());
    assert!(dir.path().join("account_locators.json").exists());
}
