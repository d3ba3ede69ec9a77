//! Handle resolution for `open_by_handle`.

use std::sync::Arc;

use miniapp_core::{ApiError, Notice, PeerRecord, api::ResolvedPeer};

use super::{
    actor::{Actor, Completion},
    pending::{RequestId, settle},
};

impl Actor {
    /// Resolve `handle`, from the identity cache when possible. A new lookup
    /// replaces the one in flight.
    pub(super) fn resolve(&mut self, handle: String) {
        if let Some(record) = self.identities.by_handle(&handle) {
            tracing::debug!(%handle, peer = %record.id, "Handle resolved from cache");
            self.on_resolved(record);
            return;
        }
        let api = Arc::clone(&self.api);
        let query = handle.clone();
        self.lookup = Some(self.tasks.spawn(
            async move { api.resolve_handle(&query).await },
            move |id, result| Completion::Resolve { id, handle, result },
        ));
    }

    pub(super) fn on_lookup(
        &mut self,
        id: RequestId,
        handle: String,
        result: Result<ResolvedPeer, ApiError>,
    ) {
        if !settle(&mut self.lookup, id) {
            return;
        }
        match result {
            Ok(resolved) => {
                self.ingest(resolved.peers);
                let Some(record) = resolved.peer.and_then(|peer| self.identities.get(peer)) else {
                    tracing::debug!(%handle, "Lookup returned no peer");
                    return;
                };
                self.on_resolved(record);
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(%handle, "Handle not found");
                self.notifier.notify(Notice::HandleNotFound { handle });
            }
            Err(e) => tracing::debug!(%handle, "Handle lookup failed: {e}"),
        }
    }

    fn on_resolved(&mut self, record: PeerRecord) {
        if !record.is_bot() {
            self.notifier.notify(Notice::Unsupported);
            return;
        }
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        ctx.agent = Some(record.id);
        let (peer, start_param) = (ctx.peer, ctx.start_param.clone());
        self.request_add_to_surface(Some(peer), record.id, start_param);
    }
}
