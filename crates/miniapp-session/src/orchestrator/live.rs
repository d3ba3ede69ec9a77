//! Live session state and the callbacks handed to its surface.

use std::sync::Arc;

use bytes::Bytes;
use miniapp_core::{LinkOpener, Surface, SurfaceCallbacks};
use tokio::sync::{mpsc, watch};
use url::Url;

use super::{actor::Completion, keepalive::Keepalive};

/// A session whose surface is on screen.
pub(crate) struct LiveSession {
    /// Distinguishes this session's surface callbacks from older ones.
    pub(crate) generation: u64,
    pub(crate) query_id: Option<u64>,
    pub(crate) button_text: String,
    pub(crate) surface: Box<dyn Surface>,
    pub(crate) title: watch::Sender<String>,
    pub(crate) keepalive: Option<Keepalive>,
}

impl LiveSession {
    pub(crate) fn activate(&self) {
        self.surface.request_activate();
    }
}

/// Event raised by a surface.
#[derive(Debug)]
pub(crate) enum SurfaceEvent {
    Close,
    Data(Bytes),
}

/// Rewrites web links into application-local links.
#[derive(Debug, Clone)]
pub(crate) struct LinkRewriter {
    scheme: String,
    hosts: Vec<String>,
}

impl LinkRewriter {
    pub(crate) fn new(scheme: impl Into<String>, hosts: &[String]) -> Self {
        Self {
            scheme: scheme.into(),
            hosts: hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    pub(crate) fn is_local(&self, uri: &str) -> bool {
        uri.split_once("://")
            .is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case(&self.scheme))
    }

    /// `https://<host>/<name>?<query>` becomes
    /// `<scheme>://resolve?domain=<name>&<query>` for configured hosts.
    /// Anything else is returned unchanged.
    pub(crate) fn to_local(&self, uri: &str) -> String {
        let Ok(url) = Url::parse(uri) else {
            return uri.to_string();
        };
        if !matches!(url.scheme(), "http" | "https") {
            return uri.to_string();
        }
        let Some(host) = url.host_str() else {
            return uri.to_string();
        };
        let host = host.strip_prefix("www.").unwrap_or(host).to_ascii_lowercase();
        if !self.hosts.contains(&host) {
            return uri.to_string();
        }
        let Some(domain) = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
        else {
            return uri.to_string();
        };
        match url.query() {
            Some(query) if !query.is_empty() => {
                format!("{}://resolve?domain={domain}&{query}", self.scheme)
            }
            _ => format!("{}://resolve?domain={domain}", self.scheme),
        }
    }
}

/// Callbacks of one live session's surface.
///
/// Events are posted back to the orchestrator tagged with the session
/// generation, so a surface that outlived its session cannot touch the next
/// one.
pub(crate) struct SessionCallbacks {
    pub(crate) generation: u64,
    pub(crate) completions: mpsc::UnboundedSender<Completion>,
    pub(crate) links: LinkRewriter,
    pub(crate) opener: Arc<dyn LinkOpener>,
}

impl SessionCallbacks {
    fn post(&self, event: SurfaceEvent) {
        let _ = self.completions.send(Completion::Surface {
            generation: self.generation,
            event,
        });
    }
}

impl SurfaceCallbacks for SessionCallbacks {
    fn close(&self) {
        self.post(SurfaceEvent::Close);
    }

    fn send_data(&self, data: Bytes) {
        self.post(SurfaceEvent::Data(data));
    }

    fn handle_local_uri(&self, uri: &str) -> bool {
        let local = self.links.to_local(uri);
        if local == uri {
            return self.links.is_local(&local);
        }
        if !self.links.is_local(&local) {
            return false;
        }
        tracing::debug!(%uri, %local, "Opening local link from surface");
        self.opener.open(&local);
        self.close();
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Opened(Mutex<Vec<String>>);

    impl LinkOpener for Opened {
        fn open(&self, local_uri: &str) {
            self.0.lock().unwrap().push(local_uri.to_string());
        }
    }

    fn rewriter() -> LinkRewriter {
        LinkRewriter::new("app", &["Example.org".to_string()])
    }

    #[test]
    fn rewrites_configured_hosts() {
        let links = rewriter();
        assert_eq!(
            links.to_local("https://example.org/gamebot?start=abc"),
            "app://resolve?domain=gamebot&start=abc"
        );
        assert_eq!(
            links.to_local("https://www.example.org/gamebot"),
            "app://resolve?domain=gamebot"
        );
        assert_eq!(links.to_local("https://other.org/x"), "https://other.org/x");
        assert_eq!(links.to_local("https://example.org/"), "https://example.org/");
        assert_eq!(links.to_local("not a url"), "not a url");
    }

    #[test]
    fn local_uri_opens_and_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let opener = Arc::new(Opened::default());
        let callbacks = SessionCallbacks {
            generation: 3,
            completions: tx,
            links: rewriter(),
            opener: Arc::clone(&opener) as Arc<dyn LinkOpener>,
        };

        assert!(callbacks.handle_local_uri("https://example.org/shop"));
        assert_eq!(*opener.0.lock().unwrap(), vec!["app://resolve?domain=shop".to_string()]);
        assert!(matches!(
            rx.try_recv(),
            Ok(Completion::Surface {
                generation: 3,
                event: SurfaceEvent::Close
            })
        ));

        assert!(callbacks.handle_local_uri("app://settings"));
        assert!(!callbacks.handle_local_uri("https://other.org/page"));
        assert_eq!(opener.0.lock().unwrap().len(), 1);
        assert!(rx.try_recv().is_err());
    }
}
