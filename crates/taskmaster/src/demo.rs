//! Scripted walk-through: two users, one shared collection.

use std::io::Write;

use anyhow::Result;
use taskmaster_app::AppConfig;
use taskmaster_store_memory::MemoryDocumentStore;
use tracing::info;

use crate::context::AppContext;
use crate::shell::Shell;

const ALICE: &[&str] = &[
    "signup alice@example.com secret1",
    "add \"Buy milk\" -p low -c shopping",
    "add \"File taxes\" -p urgent -c finance --due 2026-04-15",
    "ls",
];

const BOB: &[&str] = &["signup bob@example.com secret1", "ls", "stats"];

const ALICE_AGAIN: &[&str] = &[
    "logout",
    "rm {milk}",
    "login alice@example.com secret1",
    "toggle {milk}",
    "ls completed",
    "rm {milk}",
    "toggle {milk}",
    "stats",
];

/// Run the scenario, echoing every command before its output.
pub async fn run<W: Write>(config: &AppConfig, out: &mut W) -> Result<()> {
    let store = MemoryDocumentStore::new(config.store.collection.clone());
    let mut alice = Shell::new(AppContext::with_store(config, store.clone()), Vec::new());
    let mut bob = Shell::new(AppContext::with_store(config, store.clone()), Vec::new());

    play(&mut alice, "alice", ALICE, "").await?;
    let milk = alice
        .context()
        .tasks
        .snapshot()
        .tasks
        .iter()
        .find(|task| task.title == "Buy milk")
        .map(|task| task.id.to_string())
        .unwrap_or_default();
    info!(%milk, "Alice's first task");

    play(&mut bob, "bob", BOB, &milk).await?;
    play(&mut alice, "alice", ALICE_AGAIN, &milk).await?;

    out.write_all(&alice.into_output())?;
    out.write_all(&bob.into_output())?;
    info!(documents = store.len(), "Demo finished");
    Ok(())
}

async fn play(shell: &mut Shell<Vec<u8>>, who: &str, script: &[&str], milk: &str) -> Result<()> {
    for line in script {
        let line = line.replace("{milk}", milk);
        writeln!(shell.output_mut(), "{who}> {line}")?;
        shell.run_line(&line).await?;
    }
    Ok(())
}
