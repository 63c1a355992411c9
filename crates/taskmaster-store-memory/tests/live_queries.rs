#![allow(missing_docs)]

use anyhow::{Context, Result};
use taskmaster_core::{Category, Priority, Task, UserId};
use taskmaster_store_memory::{MemoryDocumentStore, MemoryIdentityProvider};

fn task_for(owner: &UserId, title: &str) -> Task {
    Task {
        user_id: owner.clone(),
        ..Task::new(title)
            .with_priority(Priority::Low)
            .with_category(Category::Shopping)
    }
}

#[tokio::test]
async fn listeners_only_see_their_owners_documents() -> Result<()> {
    let auth = MemoryIdentityProvider::with_settings(4, 6);
    let alice = auth.sign_up_with_password("alice@example.com", "secret1")?.user_id;
    let bob = auth.sign_up_with_password("bob@example.com", "secret1")?.user_id;

    let store = MemoryDocumentStore::default();
    let mut alice_feed = store.listen(&alice)?;
    let mut bob_feed = store.listen(&bob)?;
    assert!(alice_feed.next().await.context("initial")??.is_empty());
    assert!(bob_feed.next().await.context("initial")??.is_empty());

    // A second handle shares the same collection.
    let writer = store.clone();
    let created = writer.create(&task_for(&alice, "Buy milk"))?;

    let emitted = alice_feed.next().await.context("after create")??;
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].id, created.id);
    assert_eq!(emitted[0].user_id, alice);
    assert!(!emitted[0].is_completed);

    // Bob's feed is not notified for Alice's writes.
    writer.create(&task_for(&bob, "Walk dog"))?;
    let bob_tasks = bob_feed.next().await.context("bob emission")??;
    assert_eq!(bob_tasks.len(), 1);
    assert!(bob_tasks.iter().all(|task| task.user_id == bob));
    Ok(())
}

#[tokio::test]
async fn replace_keeps_the_stored_owner() -> Result<()> {
    let store = MemoryDocumentStore::default();
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");
    let created = store.create(&task_for(&alice, "handover"))?;

    let mut alice_feed = store.listen(&alice)?;
    let _ = alice_feed.next().await;

    let stored = store.set(&Task {
        user_id: bob.clone(),
        title: "taken".into(),
        ..created.clone()
    })?;
    assert_eq!(stored.user_id, alice);

    let tasks = alice_feed.next().await.context("alice emission")??;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "taken");
    assert_eq!(tasks[0].user_id, alice);
    assert!(store.query(&bob)?.is_empty());
    Ok(())
}
