//! Consumes the event bus (C11) after a push lands: recomputes and
//! persists the pushed repo's stored size, refreshes derived virtual-repo
//! state, and logs activity, decoupled from the push request/response
//! path itself.

use std::sync::Arc;

use syncwerk::events::Event;
use syncwerk::Engine;

/// Run forever, driven by `engine.events`. Call once at startup; the
/// returned handle can be aborted on shutdown.
pub fn spawn(engine: Arc<Engine>) -> tokio::task::JoinHandle<()> {
    let mut rx = engine.events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => handle_event(&engine, event).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("post-push task lagged, skipped {skipped} event(s)");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

async fn handle_event(engine: &Engine, event: Event) {
    match event {
        Event::QuotaRecompute { repo_id } => {
            let version = match engine.auth.repo_version(&repo_id).await {
                Ok(v) => v,
                Err(err) => {
                    log::warn!("post-push: could not resolve version for {repo_id}: {err}");
                    return;
                }
            };
            let store = match engine.quota.store_id_for(&repo_id).await {
                Ok(s) => s,
                Err(err) => {
                    log::warn!("post-push: could not resolve store id for {repo_id}: {err}");
                    return;
                }
            };
            let head = match engine.branches.get_branch(&repo_id, syncwerk::constants::MASTER_BRANCH).await {
                Ok(Some(h)) => h,
                _ => return,
            };
            let commit = match engine.commits.get_commit(&store, version, &head) {
                Ok(c) => c,
                Err(err) => {
                    log::warn!("post-push: could not read head commit for {repo_id}: {err}");
                    return;
                }
            };
            match engine.fs.get_file_count_info(&store, version, &commit.root_id) {
                Ok(info) => {
                    log::debug!(
                        "post-push: repo {repo_id} now at {} files, {} dirs, {} bytes",
                        info.num_files,
                        info.num_dirs,
                        info.total_size
                    );
                    if let Err(err) = engine.quota.record_repo_size(&repo_id, info.total_size).await {
                        log::warn!("post-push: could not persist recomputed size for {repo_id}: {err}");
                    }
                }
                Err(err) => log::warn!("post-push: size recompute failed for {repo_id}: {err}"),
            }
        }
        Event::VirtualRepoCleanup { repo_id } => match engine.quota.descendant_virtual_repos(&repo_id).await {
            Ok(descendants) => {
                for virt_repo_id in descendants {
                    engine.caches.invalidate_virtual_repo_info(&virt_repo_id);
                    match engine.quota.store_id_for(&virt_repo_id).await {
                        Ok(store) => log::debug!(
                            "post-push: refreshed virtual repo {virt_repo_id} (store {store}) after push to origin {repo_id}"
                        ),
                        Err(err) => log::warn!("post-push: could not re-derive store for virtual repo {virt_repo_id}: {err}"),
                    }
                }
            }
            Err(err) => log::warn!("post-push: could not list virtual repos of {repo_id}: {err}"),
        },
        Event::CommitCreated { repo_id, commit_id, creator_name } => {
            log::debug!("post-push: {creator_name} pushed commit {commit_id} on repo {repo_id}");
        }
        Event::BytesTransferred { repo_id, bytes, upload } => {
            log::trace!(
                "post-push: repo {repo_id} {} {bytes} byte(s)",
                if upload { "received" } else { "sent" }
            );
        }
    }
}
