//! Per-message decisions for the relay.
//!
//! Every chat message from the visitor takes exactly one path: canned
//! greeting, mirror to the operator, or the automated responder. Operator
//! presence is read fresh for each message. Automated replies run on their
//! own task and are delivered only if the originating connection still
//! holds the user slot when they finish.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::admin::{format_operator_message, AdminFrame};
use crate::config::Persona;
use crate::fallback::Responder;
use crate::identity::{Identity, IdentityTracker};
use crate::presence;
use crate::registry::{Connection, ConnectionRegistry};
use crate::types::{ConnId, InboundFrame, Role, GREETINGS};

/// Route taken by a visitor chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Greeting,
    Mirror,
    Fallback,
}

/// Greeting first, then operator presence, then the automated responder.
pub fn dispose(text: &str, admin_open: bool) -> Disposition {
    if is_greeting(text) {
        Disposition::Greeting
    } else if admin_open {
        Disposition::Mirror
    } else {
        Disposition::Fallback
    }
}

pub fn is_greeting(text: &str) -> bool {
    let text = text.trim();
    GREETINGS.iter().any(|greeting| text.eq_ignore_ascii_case(greeting))
}

/// What `on_message` did with a frame.
#[derive(Debug)]
pub enum Handled {
    Dropped,
    Identity,
    Typing,
    Greeting,
    Mirrored,
    OperatorMessage,
    /// Automated reply in flight; the handle resolves once it has been
    /// delivered or discarded.
    Fallback(JoinHandle<()>),
}

#[derive(Debug, Default)]
struct RelayState {
    registry: ConnectionRegistry,
    identities: IdentityTracker,
}

struct Inner<R> {
    state: Mutex<RelayState>,
    responder: R,
    persona: Persona,
    next_conn_id: AtomicUsize,
}

/// Owns both connection slots and all session state for one relay.
pub struct MessageRouter<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for MessageRouter<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Responder> MessageRouter<R> {
    pub fn new(responder: R, persona: Persona) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RelayState::default()),
                responder,
                persona,
                next_conn_id: AtomicUsize::new(0),
            }),
        }
    }

    /// Registers a new socket for `role`, evicting the previous occupant of
    /// that slot. Returns the id the transport must use for later events.
    pub async fn on_connect(&self, role: Role, tx: mpsc::UnboundedSender<String>) -> ConnId {
        let conn_id = self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.inner.state.lock().await;

        if let Some(previous) = state.registry.register(Connection::new(conn_id, role, tx)) {
            info!(
                conn_id,
                evicted = previous.id(),
                role = role.as_str(),
                "connection replaced previous occupant"
            );
            if role == Role::User {
                state.identities.discard(previous.id());
            }
        }

        info!(conn_id, role = role.as_str(), "connected");
        conn_id
    }

    pub async fn on_close(&self, conn_id: ConnId) {
        let mut state = self.inner.state.lock().await;
        state.identities.discard(conn_id);
        match state.registry.release(conn_id) {
            Some(role) => info!(conn_id, role = role.as_str(), "disconnected"),
            None => debug!(conn_id, "evicted connection closed"),
        }
    }

    pub async fn on_message(&self, conn_id: ConnId, raw: &str) -> Handled {
        let mut state = self.inner.state.lock().await;
        match state.registry.role_of(conn_id) {
            Some(Role::User) => self.handle_user_frame(&mut state, conn_id, raw),
            Some(Role::Admin) => self.handle_admin_frame(&state, conn_id, raw),
            None => {
                debug!(conn_id, "ignoring frame from evicted connection");
                Handled::Dropped
            }
        }
    }

    fn handle_user_frame(&self, state: &mut RelayState, conn_id: ConnId, raw: &str) -> Handled {
        let frame = match InboundFrame::decode(raw) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(conn_id, error = %err, "dropping malformed frame");
                return Handled::Dropped;
            }
        };

        match frame {
            InboundFrame::Identity { name, location, ip } => {
                let identity =
                    Identity::from_parts(name.as_deref(), location.as_deref(), ip.as_deref());
                debug!(conn_id, label = %identity.label(), "identity set");
                state.identities.set_identity(conn_id, identity);
                Handled::Identity
            }
            InboundFrame::Typing {} => {
                presence::relay_user_typing(&state.registry, &state.identities, conn_id);
                Handled::Typing
            }
            InboundFrame::Chat { message } => self.handle_chat(state, conn_id, &message),
        }
    }

    fn handle_chat(&self, state: &RelayState, conn_id: ConnId, message: &str) -> Handled {
        let text = message.trim();
        if text.is_empty() {
            debug!(conn_id, "ignoring empty chat message");
            return Handled::Dropped;
        }

        let admin = state.registry.current_admin();
        match dispose(text, admin.is_some()) {
            Disposition::Greeting => {
                if let Some(user) = state.registry.user_if_current(conn_id) {
                    user.send(self.inner.persona.greeting());
                }
                Handled::Greeting
            }
            Disposition::Mirror => {
                if let Some(admin) = admin {
                    let label = state.identities.label_for(conn_id);
                    admin.send(format!("{label}: {text}"));
                }
                Handled::Mirrored
            }
            Disposition::Fallback => {
                presence::signal_assistant_typing(&state.registry, conn_id);
                Handled::Fallback(self.spawn_fallback(conn_id, text.to_string()))
            }
        }
    }

    fn handle_admin_frame(&self, state: &RelayState, conn_id: ConnId, raw: &str) -> Handled {
        match AdminFrame::classify(raw) {
            AdminFrame::Typing => {
                presence::relay_admin_typing(&state.registry);
                Handled::Typing
            }
            AdminFrame::Control(token) => {
                debug!(conn_id, token, "ignoring unknown control frame");
                Handled::Dropped
            }
            AdminFrame::Empty => Handled::Dropped,
            AdminFrame::Chat(text) => {
                let Some(user) = state.registry.current_user() else {
                    debug!(conn_id, "no user connected; operator message dropped");
                    return Handled::Dropped;
                };
                user.send(format_operator_message(
                    &self.inner.persona.operator_name,
                    text,
                ));
                Handled::OperatorMessage
            }
        }
    }

    fn spawn_fallback(&self, conn_id: ConnId, text: String) -> JoinHandle<()> {
        let router = self.clone();
        tokio::spawn(async move {
            let persona = &router.inner.persona;
            let reply = match router.inner.responder.respond(&text).await {
                Ok(reply) => persona.speak(&reply),
                Err(err) => {
                    warn!(conn_id, error = %err, "fallback responder failed");
                    persona.failure(&err)
                }
            };
            router.deliver_to_user(conn_id, reply).await;
        })
    }

    /// Sends only while `conn_id` still holds the user slot; late results
    /// for a closed or replaced connection are discarded.
    async fn deliver_to_user(&self, conn_id: ConnId, payload: String) -> bool {
        let state = self.inner.state.lock().await;
        match state.registry.user_if_current(conn_id) {
            Some(user) => user.send(payload),
            None => {
                debug!(conn_id, "discarding reply for departed connection");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::sync::{mpsc::UnboundedReceiver, Notify};
    use tokio::time::timeout;

    use super::*;
    use crate::error::FallbackError;

    #[derive(Clone, Default)]
    struct ScriptedResponder {
        calls: Arc<StdMutex<Vec<String>>>,
        fail_with: Option<u16>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedResponder {
        fn failing(status: u16) -> Self {
            Self {
                fail_with: Some(status),
                ..Self::default()
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Responder for ScriptedResponder {
        fn respond(
            &self,
            user_text: &str,
        ) -> impl Future<Output = Result<String, FallbackError>> + Send {
            self.calls.lock().unwrap().push(user_text.to_string());
            let fail_with = self.fail_with;
            let gate = self.gate.clone();
            let echoed = format!("echo {user_text}");
            async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                match fail_with {
                    Some(status) => Err(FallbackError::Status {
                        status,
                        body: "internal provider detail".to_string(),
                    }),
                    None => Ok(echoed),
                }
            }
        }
    }

    async fn connect(
        router: &MessageRouter<ScriptedResponder>,
        role: Role,
    ) -> (ConnId, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (router.on_connect(role, tx).await, rx)
    }

    fn chat(message: &str) -> String {
        json!({ "type": "chat", "message": message }).to_string()
    }

    async fn finish(handled: Handled) {
        match handled {
            Handled::Fallback(handle) => timeout(Duration::from_secs(2), handle)
                .await
                .expect("fallback finished")
                .expect("fallback task panicked"),
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn greeting_takes_precedence() {
        assert_eq!(dispose("Hello", true), Disposition::Greeting);
        assert_eq!(dispose("HEY", false), Disposition::Greeting);
        assert_eq!(dispose("hello there", true), Disposition::Mirror);
        assert_eq!(dispose("hello there", false), Disposition::Fallback);
        assert!(!is_greeting("hiya"));
    }

    #[tokio::test]
    async fn greeting_is_canned_without_provider_call() {
        let responder = ScriptedResponder::default();
        let router = MessageRouter::new(responder.clone(), Persona::default());
        let (user, mut user_rx) = connect(&router, Role::User).await;

        for greeting in ["hi", "Hello", "  HEY "] {
            assert!(matches!(router.on_message(user, &chat(greeting)).await, Handled::Greeting));
            assert_eq!(
                user_rx.try_recv().unwrap(),
                "AI Nik: Hello! I'm Nikhil's personal AI assistant. What would you like to know?"
            );
        }
        assert_eq!(responder.call_count(), 0);
    }

    #[tokio::test]
    async fn greeting_with_admin_present_skips_admin() {
        let responder = ScriptedResponder::default();
        let router = MessageRouter::new(responder.clone(), Persona::default());
        let (_admin, mut admin_rx) = connect(&router, Role::Admin).await;
        let (user, mut user_rx) = connect(&router, Role::User).await;

        assert!(matches!(router.on_message(user, &chat("hello")).await, Handled::Greeting));
        assert!(user_rx.try_recv().unwrap().contains("personal AI assistant"));
        assert!(admin_rx.try_recv().is_err());
        assert_eq!(responder.call_count(), 0);
    }

    #[tokio::test]
    async fn admin_presence_mirrors_and_suppresses_fallback() {
        let responder = ScriptedResponder::default();
        let router = MessageRouter::new(responder.clone(), Persona::default());
        let (_admin, mut admin_rx) = connect(&router, Role::Admin).await;
        let (user, mut user_rx) = connect(&router, Role::User).await;

        let identity = json!({ "type": "identity", "name": "Jordan", "location": "NYC", "ip": "1.2.3.4" });
        router.on_message(user, &identity.to_string()).await;
        assert!(matches!(
            router.on_message(user, &chat("  Can we talk?  ")).await,
            Handled::Mirrored
        ));

        assert_eq!(admin_rx.try_recv().unwrap(), "NYC@1.2.3.4_Jordan: Can we talk?");
        assert!(user_rx.try_recv().is_err());
        assert_eq!(responder.call_count(), 0);
    }

    #[tokio::test]
    async fn unidentified_user_is_labelled_user() {
        let router = MessageRouter::new(ScriptedResponder::default(), Persona::default());
        let (_admin, mut admin_rx) = connect(&router, Role::Admin).await;
        let (user, _user_rx) = connect(&router, Role::User).await;

        router.on_message(user, &chat("anyone there?")).await;
        assert_eq!(admin_rx.try_recv().unwrap(), "User: anyone there?");
    }

    #[tokio::test]
    async fn no_admin_invokes_fallback_once() {
        let responder = ScriptedResponder::default();
        let router = MessageRouter::new(responder.clone(), Persona::default());
        let (user, mut user_rx) = connect(&router, Role::User).await;

        finish(router.on_message(user, &chat("What are your skills?")).await).await;

        assert_eq!(user_rx.try_recv().unwrap(), "__ai_typing__");
        assert_eq!(user_rx.try_recv().unwrap(), "AI Nik: echo What are your skills?");
        assert!(user_rx.try_recv().is_err());
        assert_eq!(responder.call_count(), 1);
    }

    #[tokio::test]
    async fn admin_presence_is_checked_per_message() {
        let responder = ScriptedResponder::default();
        let router = MessageRouter::new(responder.clone(), Persona::default());
        let (user, _user_rx) = connect(&router, Role::User).await;

        let (admin, mut admin_rx) = connect(&router, Role::Admin).await;
        assert!(matches!(router.on_message(user, &chat("first")).await, Handled::Mirrored));
        assert_eq!(admin_rx.try_recv().unwrap(), "User: first");

        router.on_close(admin).await;
        finish(router.on_message(user, &chat("second")).await).await;
        assert_eq!(responder.call_count(), 1);
    }

    #[tokio::test]
    async fn admin_dropped_without_close_notice_is_not_mirrored() {
        let responder = ScriptedResponder::default();
        let router = MessageRouter::new(responder.clone(), Persona::default());
        let (_admin, admin_rx) = connect(&router, Role::Admin).await;
        let (user, _user_rx) = connect(&router, Role::User).await;

        drop(admin_rx);
        finish(router.on_message(user, &chat("still there?")).await).await;
        assert_eq!(responder.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_sends_degraded_text() {
        let responder = ScriptedResponder::failing(500);
        let router = MessageRouter::new(responder.clone(), Persona::default());
        let (user, mut user_rx) = connect(&router, Role::User).await;

        finish(router.on_message(user, &chat("tell me more")).await).await;

        assert_eq!(user_rx.try_recv().unwrap(), "__ai_typing__");
        let reply = user_rx.try_recv().unwrap();
        assert_eq!(
            reply,
            "AI Nik: I'm currently having trouble answering. Please try again soon."
        );
        assert!(!reply.contains("internal provider detail"));

        // The session keeps working afterwards.
        assert!(matches!(router.on_message(user, &chat("hi")).await, Handled::Greeting));
    }

    #[tokio::test]
    async fn blank_and_malformed_frames_send_nothing() {
        let responder = ScriptedResponder::default();
        let router = MessageRouter::new(responder.clone(), Persona::default());
        let (_admin, mut admin_rx) = connect(&router, Role::Admin).await;
        let (user, mut user_rx) = connect(&router, Role::User).await;

        for raw in [
            chat(""),
            chat("   \n\t"),
            "not json".to_string(),
            json!({ "type": "dance" }).to_string(),
            json!({ "type": "chat" }).to_string(),
        ] {
            assert!(matches!(router.on_message(user, &raw).await, Handled::Dropped));
        }

        assert!(user_rx.try_recv().is_err());
        assert!(admin_rx.try_recv().is_err());
        assert_eq!(responder.call_count(), 0);
    }

    #[tokio::test]
    async fn typing_is_relayed_both_ways() {
        let router = MessageRouter::new(ScriptedResponder::default(), Persona::default());
        let (admin, mut admin_rx) = connect(&router, Role::Admin).await;
        let (user, mut user_rx) = connect(&router, Role::User).await;

        router
            .on_message(user, &json!({ "type": "identity", "name": "Jordan" }).to_string())
            .await;
        router.on_message(user, r#"{"type":"typing"}"#).await;
        let notice: Value = serde_json::from_str(&admin_rx.try_recv().unwrap()).unwrap();
        assert_eq!(notice, json!({ "type": "__user_typing__", "name": "Jordan" }));

        router.on_message(admin, "__typing__").await;
        assert_eq!(user_rx.try_recv().unwrap(), "__admin_typing__");
    }

    #[tokio::test]
    async fn typing_is_never_replayed_after_reconnect() {
        let router = MessageRouter::new(ScriptedResponder::default(), Persona::default());
        let (user, _user_rx) = connect(&router, Role::User).await;

        // No admin yet: the signal goes nowhere.
        router.on_message(user, r#"{"type":"typing"}"#).await;
        router.on_close(user).await;

        let (_admin, mut admin_rx) = connect(&router, Role::Admin).await;
        let (_user, _user_rx) = connect(&router, Role::User).await;
        assert!(admin_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn operator_messages_are_labelled() {
        let router = MessageRouter::new(ScriptedResponder::default(), Persona::default());
        let (admin, _admin_rx) = connect(&router, Role::Admin).await;
        let (_user, mut user_rx) = connect(&router, Role::User).await;

        assert!(matches!(
            router.on_message(admin, "Hi, Nik here").await,
            Handled::OperatorMessage
        ));
        assert_eq!(user_rx.try_recv().unwrap(), "Nik: Hi, Nik here");

        assert!(matches!(router.on_message(admin, "__refresh__").await, Handled::Dropped));
        assert!(matches!(router.on_message(admin, "  ").await, Handled::Dropped));
        assert!(user_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn operator_message_without_user_is_dropped() {
        let router = MessageRouter::new(ScriptedResponder::default(), Persona::default());
        let (admin, _admin_rx) = connect(&router, Role::Admin).await;
        assert!(matches!(router.on_message(admin, "hello?").await, Handled::Dropped));
    }

    #[tokio::test]
    async fn late_reply_after_disconnect_is_discarded() {
        let gate = Arc::new(Notify::new());
        let responder = ScriptedResponder::gated(gate.clone());
        let router = MessageRouter::new(responder.clone(), Persona::default());
        let (user, mut user_rx) = connect(&router, Role::User).await;

        let handled = router.on_message(user, &chat("slow question")).await;
        assert_eq!(user_rx.try_recv().unwrap(), "__ai_typing__");

        router.on_close(user).await;
        let (_next, mut next_rx) = connect(&router, Role::User).await;

        gate.notify_one();
        finish(handled).await;

        assert!(user_rx.try_recv().is_err());
        assert!(next_rx.try_recv().is_err());
        assert_eq!(responder.call_count(), 1);
    }

    #[tokio::test]
    async fn eviction_keeps_new_occupant() {
        let router = MessageRouter::new(ScriptedResponder::default(), Persona::default());
        let (_admin, mut admin_rx) = connect(&router, Role::Admin).await;
        let (old, _old_rx) = connect(&router, Role::User).await;
        router
            .on_message(old, &json!({ "type": "identity", "name": "Old" }).to_string())
            .await;

        let (new, _new_rx) = connect(&router, Role::User).await;
        assert!(matches!(router.on_message(old, &chat("ghost")).await, Handled::Dropped));

        // Late close from the evicted socket must not clear the slot.
        router.on_close(old).await;
        router.on_message(new, &chat("question")).await;
        assert_eq!(admin_rx.try_recv().unwrap(), "User: question");
    }

    #[tokio::test]
    async fn eviction_closes_previous_outbound_channel() {
        let router = MessageRouter::new(ScriptedResponder::default(), Persona::default());
        let (_old, mut old_rx) = connect(&router, Role::User).await;
        let (_new, mut new_rx) = connect(&router, Role::User).await;

        assert!(timeout(Duration::from_secs(1), old_rx.recv())
            .await
            .expect("channel closed")
            .is_none());
        assert!(new_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn concurrent_fallback_calls_are_not_serialized() {
        let gate = Arc::new(Notify::new());
        let responder = ScriptedResponder::gated(gate.clone());
        let router = MessageRouter::new(responder.clone(), Persona::default());
        let (user, mut user_rx) = connect(&router, Role::User).await;

        let first = router.on_message(user, &chat("one")).await;
        let second = router.on_message(user, &chat("two")).await;

        timeout(Duration::from_secs(2), async {
            while responder.call_count() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("both calls started");
        assert_eq!(responder.call_count(), 2);

        gate.notify_waiters();
        finish(first).await;
        finish(second).await;

        assert_eq!(user_rx.try_recv().unwrap(), "__ai_typing__");
        assert_eq!(user_rx.try_recv().unwrap(), "__ai_typing__");
        let mut replies = vec![user_rx.try_recv().unwrap(), user_rx.try_recv().unwrap()];
        replies.sort();
        assert_eq!(replies, ["AI Nik: echo one", "AI Nik: echo two"]);
        assert!(user_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn padded_typing_token_is_not_shown_as_chat() {
        let router = MessageRouter::new(ScriptedResponder::default(), Persona::default());
        let (admin, _admin_rx) = connect(&router, Role::Admin).await;
        let (_user, mut user_rx) = connect(&router, Role::User).await;

        assert!(matches!(router.on_message(admin, " __typing__ ").await, Handled::Typing));
        assert_eq!(user_rx.try_recv().unwrap(), "__admin_typing__");
        assert!(matches!(router.on_message(admin, "__ping__\n").await, Handled::Dropped));
        assert!(user_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconnect_starts_with_default_identity() {
        let router = MessageRouter::new(ScriptedResponder::default(), Persona::default());
        let (_admin, mut admin_rx) = connect(&router, Role::Admin).await;
        let (user, _rx) = connect(&router, Role::User).await;
        router
            .on_message(user, &json!({ "type": "identity", "name": "Jordan" }).to_string())
            .await;
        router.on_close(user).await;

        let (user, _rx) = connect(&router, Role::User).await;
        router.on_message(user, &chat("back again")).await;
        assert_eq!(admin_rx.try_recv().unwrap(), "User: back again");
    }

    mod http {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use super::*;
        use crate::config::{ProviderConfig, ProviderKind};
        use crate::fallback::HttpResponder;
        use crate::prompting::FallbackContext;

        fn http_router(server: &MockServer) -> MessageRouter<HttpResponder> {
            let persona = Persona::default();
            let provider = ProviderConfig {
                endpoint: server.uri(),
                kind: ProviderKind::HfInference,
                model: "test".to_string(),
                api_key: Some("key".to_string()),
                timeout: Duration::from_secs(5),
            };
            let responder =
                HttpResponder::new(provider, FallbackContext::builtin(&persona)).unwrap();
            MessageRouter::new(responder, persona)
        }

        #[tokio::test]
        async fn identity_then_question_round_trip() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({ "generated_text": "AI Nik: Python and Go." })),
                )
                .expect(1)
                .mount(&server)
                .await;

            let router = http_router(&server);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let user = router.on_connect(Role::User, tx).await;

            let identity = json!({ "type": "identity", "name": "Jordan", "location": "NYC", "ip": "1.2.3.4" });
            router.on_message(user, &identity.to_string()).await;
            let handled = router
                .on_message(user, &json!({ "type": "chat", "message": "What are your skills?" }).to_string())
                .await;
            let Handled::Fallback(handle) = handled else {
                panic!("expected fallback");
            };
            handle.await.unwrap();

            assert_eq!(rx.try_recv().unwrap(), "__ai_typing__");
            assert_eq!(rx.try_recv().unwrap(), "AI Nik: Python and Go.");

            let requests = server.received_requests().await.unwrap();
            let body = String::from_utf8_lossy(&requests[0].body);
            assert!(body.contains("What are your skills?"));
        }

        #[tokio::test]
        async fn provider_error_status_reaches_user_as_apology() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
                .expect(1)
                .mount(&server)
                .await;

            let router = http_router(&server);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let user = router.on_connect(Role::User, tx).await;
            let Handled::Fallback(handle) = router.on_message(user, &chat("resume?")).await else {
                panic!("expected fallback");
            };
            handle.await.unwrap();

            assert_eq!(rx.try_recv().unwrap(), "__ai_typing__");
            assert_eq!(
                rx.try_recv().unwrap(),
                "AI Nik: I'm currently having trouble answering. Please try again soon."
            );
        }
    }
}
