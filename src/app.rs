use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::assistant::{AssistantClient, ChatReply, TransportError};
use crate::session::Session;
use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub type ChatTask = JoinHandle<Result<ChatReply, TransportError>>;

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Chat panel. `session` is Some exactly while the panel is open.
    pub session: Option<Session>,
    pub fullscreen: bool,
    pub chat_task: Option<ChatTask>,
    pub chat_scroll: u16,
    pub chat_height: u16, // inner size of the transcript area, set while rendering
    pub chat_width: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub client: AssistantClient,
    pub web_base_url: String,
}

impl App {
    pub fn new(client: AssistantClient, web_base_url: &str) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            session: None,
            fullscreen: false,
            chat_task: None,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            client,
            web_base_url: web_base_url.to_string(),
        }
    }

    pub fn is_panel_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(Session::is_awaiting_response)
    }

    pub fn open_panel(&mut self) {
        if self.session.is_none() {
            debug!("assistant panel opened");
            self.session = Some(Session::new());
            self.chat_scroll = 0;
        }
    }

    /// Close the panel and throw the conversation away. A request still in
    /// flight keeps running on its own task; its reply is discarded.
    pub fn close_panel(&mut self) {
        if self.session.take().is_some() {
            debug!(in_flight = self.chat_task.is_some(), "assistant panel closed");
        }
        self.chat_task = None;
        self.fullscreen = false;
        self.input_mode = InputMode::Normal;
        self.chat_scroll = 0;
    }

    pub fn toggle_fullscreen(&mut self) {
        if self.is_panel_open() {
            self.fullscreen = !self.fullscreen;
        }
    }

    /// Send the input box contents on a background task.
    ///
    /// Returns false when nothing was sent: no panel, blank input, or a
    /// request already outstanding.
    pub fn submit_pending(&mut self) -> bool {
        if self.chat_task.is_some() {
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let Some(payload) = session.submit_pending() else {
            return false;
        };

        let client = self.client.clone();
        self.chat_task = Some(tokio::spawn(async move { client.ask(&payload).await }));
        self.scroll_chat_to_bottom();
        true
    }

    /// Hand a finished request's outcome to the session. Does nothing while
    /// the request is still running.
    pub async fn poll_chat_task(&mut self) {
        if !self.chat_task.as_ref().is_some_and(|task| task.is_finished()) {
            return;
        }
        let Some(task) = self.chat_task.take() else {
            return;
        };

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "assistant request task failed");
                Err(TransportError::Interrupted(err.to_string()))
            }
        };

        if let Some(session) = self.session.as_mut() {
            session.resolve(outcome);
            self.scroll_chat_to_bottom();
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_awaiting_response() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.transcript_line_count().saturating_sub(self.visible_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    /// Scroll so the newest message (or the busy indicator) is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let total_lines = self.transcript_line_count();
        let visible_height = self.visible_height();
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Rendered height of the transcript, wrapped exactly as the panel
    /// draws it.
    pub fn transcript_line_count(&self) -> u16 {
        let Some(session) = self.session.as_ref() else {
            return 0;
        };
        let wrap_width = if self.chat_width > 0 { self.chat_width } else { 50 };

        let lines = ui::transcript_paragraph(session, &self.web_base_url, self.animation_frame)
            .line_count(wrap_width);
        lines.min(u16::MAX as usize) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CONNECT_ERROR, GREETING};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        std::net::TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn test_app(endpoint: &str) -> App {
        App::new(AssistantClient::new(endpoint), "http://localhost:5173")
    }

    async fn wait_for_reply(app: &mut App) {
        for _ in 0..200 {
            app.poll_chat_task().await;
            if !app.is_awaiting_response() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("assistant reply never arrived");
    }

    #[test]
    fn test_panel_lifecycle_creates_fresh_session() {
        let mut app = test_app("http://127.0.0.1:1/api/chat");
        assert!(!app.is_panel_open());

        app.open_panel();
        app.session.as_mut().unwrap().set_pending_input("draft");
        app.toggle_fullscreen();
        assert!(app.fullscreen);

        app.close_panel();
        assert!(app.session.is_none());
        assert!(!app.fullscreen);

        app.open_panel();
        let session = app.session.as_ref().unwrap();
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].content, GREETING);
        assert_eq!(session.pending_input(), "");
    }

    #[test]
    fn test_fullscreen_requires_open_panel() {
        let mut app = test_app("http://127.0.0.1:1/api/chat");
        app.toggle_fullscreen();
        assert!(!app.fullscreen);
    }

    #[test]
    fn test_submit_without_panel_does_nothing() {
        let mut app = test_app("http://127.0.0.1:1/api/chat");
        assert!(!app.submit_pending());
        assert!(app.chat_task.is_none());
    }

    #[tokio::test]
    async fn test_submit_and_poll_reply() {
        if !can_bind_localhost() {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "answer": "Library opens at 9" }))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut app = test_app(&format!("{}/api/chat", server.uri()));
        app.open_panel();
        app.session.as_mut().unwrap().set_pending_input("library timings?");

        assert!(app.submit_pending());
        assert!(app.is_awaiting_response());

        // A second send while busy is ignored and dispatches nothing
        app.session.as_mut().unwrap().set_pending_input("again");
        assert!(!app.submit_pending());
        assert_eq!(app.session.as_ref().unwrap().transcript().len(), 2);

        wait_for_reply(&mut app).await;

        let transcript = app.session.as_ref().unwrap().transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[2].content, "Library opens at 9");
        assert!(app.chat_task.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_reports_connect_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        }
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let mut app = test_app(&format!("http://127.0.0.1:{}/api/chat", port));
        app.open_panel();
        app.session.as_mut().unwrap().set_pending_input("hello");
        assert!(app.submit_pending());

        wait_for_reply(&mut app).await;

        let last = app.session.as_ref().unwrap().transcript().last().unwrap().clone();
        assert_eq!(last.content, CONNECT_ERROR);
    }

    #[tokio::test]
    async fn test_closing_panel_discards_late_reply() {
        if !can_bind_localhost() {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "answer": "late" }))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let mut app = test_app(&format!("{}/api/chat", server.uri()));
        app.open_panel();
        app.session.as_mut().unwrap().set_pending_input("hi");
        assert!(app.submit_pending());

        app.close_panel();
        app.open_panel();
        tokio::time::sleep(Duration::from_millis(150)).await;
        app.poll_chat_task().await;

        let session = app.session.as_ref().unwrap();
        assert_eq!(session.transcript().len(), 1);
        assert!(!session.is_awaiting_response());
    }

    #[test]
    fn test_transcript_line_count_includes_sources() {
        let mut app = test_app("http://127.0.0.1:1/api/chat");
        app.chat_width = 80;
        app.open_panel();
        let greeting_lines = app.transcript_line_count();

        let session = app.session.as_mut().unwrap();
        session.begin("tips").unwrap();
        session.resolve(Ok(serde_json::from_value(json!({
            "success": true,
            "answer": "one\ntwo",
            "sources": [{ "id": "1", "title": "a" }, { "title": "b" }]
        }))
        .unwrap()));

        // user: role + text + blank; assistant: role + 2 lines + heading + 2 sources + blank
        assert_eq!(app.transcript_line_count(), greeting_lines + 3 + 7);
    }
}
