use std::sync::Arc;

use tokio::sync::watch;

use crate::api::{SessionContext, SignUpRequest, UserId};
use crate::client::DoujinReviewClient;

/// What the application shows for the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateView {
    Authentication,
    Application(SessionContext),
}

impl GateView {
    fn from_session(session: Option<SessionContext>) -> Self {
        match session {
            Some(session) => GateView::Application(session),
            None => GateView::Authentication,
        }
    }

    pub fn session(&self) -> Option<&SessionContext> {
        match self {
            GateView::Authentication => None,
            GateView::Application(session) => Some(session),
        }
    }
}

/// Single source of the signed-in identity on the client side.
/// The session is always read back from the server, subscribers are notified on every change.
pub struct SessionGate {
    client: Arc<DoujinReviewClient>,
    view: watch::Sender<GateView>,
}

impl SessionGate {
    /// Reads the current session once at startup
    pub async fn start(client: Arc<DoujinReviewClient>) -> anyhow::Result<Self> {
        let initial = GateView::from_session(client.session().await?);
        let (view, _) = watch::channel(initial);
        Ok(Self { client, view })
    }

    pub fn subscribe(&self) -> watch::Receiver<GateView> {
        self.view.subscribe()
    }

    pub fn current(&self) -> GateView {
        self.view.borrow().clone()
    }

    pub fn client(&self) -> &Arc<DoujinReviewClient> {
        &self.client
    }

    pub async fn refresh(&self) -> anyhow::Result<GateView> {
        let view = GateView::from_session(self.client.session().await?);
        self.publish(view.clone());
        Ok(view)
    }

    pub async fn sign_up(&self, request: &SignUpRequest) -> anyhow::Result<UserId> {
        self.client.sign_up(request).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<GateView> {
        self.client.sign_in(email, password).await?;
        self.refresh().await
    }

    pub async fn sign_out(&self) -> anyhow::Result<()> {
        let result = self.client.sign_out().await;
        // the token is gone even if the server could not be told
        self.publish(GateView::Authentication);
        result
    }

    fn publish(&self, view: GateView) {
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}
