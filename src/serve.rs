//! Local server with the login gate.
//!
//! Static hosting cannot hold gated notes back, so when `[auth]` is
//! configured the site is meant to be served by `stacks serve`. The server
//! renders every page on request from the processed manifest, built once at
//! startup.
//!
//! Request resolution order:
//! 1. `/login`, `/callback`, `/logout` (only with `[auth]`)
//! 2. Route table: home, about, books, one page per note
//! 3. `sitemap.xml` and `manifest.webmanifest`
//! 4. `assets/` under the content root
//! 5. Attachments next to notes (`/books/<folder>/<file>`)
//! 6. 404
//!
//! Requests are handled one at a time on the calling thread; the session store
//! belongs to the loop. Ctrl+C unblocks the listener and the loop returns.

use crate::auth::{
    self, AuthContext, AuthError, GateOutcome, HostedProvider, SessionView, UserProfile,
};
use crate::generate::{self, RouteTable, Site, SiteAssets};
use crate::process::ProcessedManifest;
use maud::Markup;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

/// A session unused for this long is dropped.
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(8 * 60 * 60);

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid interface address: {0}")]
    Interface(#[from] std::net::AddrParseError),
    #[error("Failed to bind after {attempts} attempts (ports {first}-{last}): {message}")]
    Bind {
        attempts: u16,
        first: u16,
        last: u16,
        message: String,
    },
    #[error("Failed to set Ctrl+C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Things worth telling the user while the server runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeEvent {
    Listening {
        addr: SocketAddr,
        /// Set when the configured port was busy.
        requested_port: Option<u16>,
        gated: bool,
    },
    Request {
        method: String,
        path: String,
        status: u16,
    },
    RequestFailed {
        path: String,
        message: String,
    },
    ShuttingDown,
}

// ============================================================================
// Replies
// ============================================================================

/// A response, independent of the HTTP library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub location: Option<String>,
    pub set_cookie: Option<String>,
}

impl Reply {
    fn html(status: u16, markup: Markup) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body: markup.into_string().into_bytes(),
            location: None,
            set_cookie: None,
        }
    }

    fn data(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            body,
            location: None,
            set_cookie: None,
        }
    }

    fn redirect(location: String) -> Self {
        Self {
            status: 302,
            content_type: "text/plain; charset=utf-8",
            body: Vec::new(),
            location: Some(location),
            set_cookie: None,
        }
    }

    fn with_cookie(mut self, cookie: String) -> Self {
        self.set_cookie = Some(cookie);
        self
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug)]
struct Session {
    user: UserProfile,
    last_seen: Instant,
}

/// Signed-in users by session id, dropped after [`SESSION_IDLE_TTL`] idle.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    /// Open a session and return its id.
    pub fn open(&mut self, user: UserProfile) -> String {
        self.open_at(user, Instant::now())
    }

    /// Open as of `now`. Idle sessions are swept first.
    pub fn open_at(&mut self, user: UserProfile, now: Instant) -> String {
        self.sessions
            .retain(|_, s| now.duration_since(s.last_seen) <= SESSION_IDLE_TTL);
        let id = auth::random_token(32);
        self.sessions.insert(
            id.clone(),
            Session {
                user,
                last_seen: now,
            },
        );
        id
    }

    pub fn get(&mut self, id: &str) -> Option<&UserProfile> {
        self.get_at(id, Instant::now())
    }

    /// Look up a session as of `now`, refreshing it. An idle one is closed.
    pub fn get_at(&mut self, id: &str, now: Instant) -> Option<&UserProfile> {
        let idle = now.duration_since(self.sessions.get(id)?.last_seen);
        if idle > SESSION_IDLE_TTL {
            self.sessions.remove(id);
            return None;
        }
        let session = self.sessions.get_mut(id)?;
        session.last_seen = now;
        Some(&session.user)
    }

    pub fn close(&mut self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn session_cookie(id: &str) -> String {
    format!(
        "{}={id}; HttpOnly; Path=/; SameSite=Lax",
        auth::SESSION_COOKIE
    )
}

fn expired_cookie() -> String {
    format!(
        "{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0",
        auth::SESSION_COOKIE
    )
}

/// Value of cookie `name` in a `Cookie` header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

/// Split a request URL into its decoded path and query parameters.
pub fn parse_url(url: &str) -> (String, HashMap<String, String>) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let path = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());

    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_query(key), decode_query(value))
        })
        .collect();
    (path, params)
}

fn decode_query(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s)
        .map(|d| d.into_owned())
        .unwrap_or(s)
}

// ============================================================================
// Site application
// ============================================================================

/// The gate settings plus the provider that serves them.
pub struct Gate {
    pub context: AuthContext,
    pub provider: Box<dyn HostedProvider>,
}

/// Everything a request needs. Owned by the server loop.
pub struct SiteApp<'a> {
    manifest: &'a ProcessedManifest,
    site: Site<'a>,
    routes: RouteTable,
    source_root: PathBuf,
    assets: SiteAssets,
    gate: Option<Gate>,
    sessions: SessionStore,
}

impl<'a> SiteApp<'a> {
    pub fn new(
        manifest: &'a ProcessedManifest,
        source_root: &Path,
        assets: SiteAssets,
        gate: Option<Gate>,
    ) -> Self {
        Self {
            manifest,
            site: Site::new(manifest, assets),
            routes: RouteTable::build(manifest),
            source_root: source_root.to_path_buf(),
            assets,
            gate,
            sessions: SessionStore::default(),
        }
    }

    pub fn is_gated(&self) -> bool {
        self.gate.is_some()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Answer one GET request.
    pub fn handle(&mut self, url: &str, cookie_header: Option<&str>) -> Reply {
        let (path, query) = parse_url(url);
        let session_id = cookie_header
            .and_then(|h| cookie_value(h, auth::SESSION_COOKIE))
            .map(str::to_string);

        if self.gate.is_some() {
            match path.as_str() {
                "/login" => return self.login(&query),
                "/callback" => return self.callback(&query),
                "/logout" => return self.logout(session_id.as_deref()),
                _ => {}
            }
        }

        let session = self.session_view(session_id.as_deref());

        if let Some(route) = self.routes.resolve(&path).cloned() {
            if route.gated {
                if let Some(reply) = self.gate_check(&session, session_id.as_deref(), &path) {
                    return reply;
                }
            }
            return match self.site.render(&route, session.as_ref()) {
                Ok(markup) => Reply::html(200, markup),
                Err(e) => Reply::html(500, self.site.error_page("Error", &e.to_string())),
            };
        }

        match path.as_str() {
            "/sitemap.xml" => {
                return Reply::data(
                    "application/xml; charset=utf-8",
                    generate::render_sitemap(self.manifest, &self.routes).into_bytes(),
                );
            }
            "/manifest.webmanifest" => {
                let value = generate::render_webmanifest(&self.manifest.config, self.assets);
                return Reply::data("application/manifest+json", value.to_string().into_bytes());
            }
            _ => {}
        }

        if let Some(rel) = path.strip_prefix("/assets/") {
            if let Some(reply) = self.serve_file(&Path::new("assets").join(rel)) {
                return reply;
            }
        }

        if let Some(rel) = path.strip_prefix("/books/") {
            if self.manifest.attachments.iter().any(|a| a == rel) {
                if self.gate.is_some() {
                    if let Some(reply) = self.gate_check(&session, session_id.as_deref(), &path) {
                        return reply;
                    }
                }
                if let Some(reply) = self.serve_file(Path::new(rel)) {
                    return reply;
                }
            }
        }

        self.not_found(&path)
    }

    /// Session view for the nav and the gate. `None` when auth is off.
    fn session_view(&mut self, session_id: Option<&str>) -> Option<SessionView> {
        self.gate.as_ref()?;
        let user = session_id.and_then(|id| self.sessions.get(id).cloned());
        Some(match user {
            Some(user) => SessionView::signed_in(user),
            None => SessionView::anonymous(),
        })
    }

    /// `None` means the page may render.
    fn gate_check(
        &mut self,
        session: &Option<SessionView>,
        session_id: Option<&str>,
        path: &str,
    ) -> Option<Reply> {
        let gate = self.gate.as_mut()?;
        let anonymous = SessionView::anonymous();
        let session = session.as_ref().unwrap_or(&anonymous);

        match gate.context.check(session, &mut *gate.provider, path) {
            GateOutcome::Render => None,
            GateOutcome::Placeholder => Some(Reply::html(200, self.site.placeholder())),
            GateOutcome::RedirectToLogin(url) => Some(Reply::redirect(url)),
            GateOutcome::LoggedOut(url) => {
                if let Some(id) = session_id {
                    self.sessions.close(id);
                }
                Some(Reply::redirect(url).with_cookie(expired_cookie()))
            }
        }
    }

    fn login(&mut self, query: &HashMap<String, String>) -> Reply {
        let return_to = query.get("returnTo").map(String::as_str).unwrap_or("/");
        match self.gate.as_mut() {
            Some(gate) => Reply::redirect(gate.provider.login_with_redirect(return_to)),
            None => self.not_found("/login"),
        }
    }

    fn callback(&mut self, query: &HashMap<String, String>) -> Reply {
        let Some(gate) = self.gate.as_mut() else {
            return self.not_found("/callback");
        };

        if let Some(error) = query.get("error") {
            let detail = query.get("error_description").unwrap_or(error);
            let failure = AuthError::Provider(detail.clone());
            return Reply::html(400, self.site.error_page("Login failed", &failure.to_string()));
        }

        let (Some(code), Some(state)) = (query.get("code"), query.get("state")) else {
            return Reply::html(
                400,
                self.site
                    .error_page("Login failed", "The login response has no code or state."),
            );
        };

        match gate.provider.complete_login(code, state) {
            Ok((user, return_path)) => {
                let id = self.sessions.open(user);
                Reply::redirect(auth::safe_return_path(&return_path)).with_cookie(session_cookie(&id))
            }
            Err(e) => Reply::html(400, self.site.error_page("Login failed", &e.to_string())),
        }
    }

    fn logout(&mut self, session_id: Option<&str>) -> Reply {
        if let Some(id) = session_id {
            self.sessions.close(id);
        }
        match self.gate.as_mut() {
            Some(gate) => {
                let origin = gate.context.origin.clone();
                Reply::redirect(gate.provider.logout(&origin)).with_cookie(expired_cookie())
            }
            None => self.not_found("/logout"),
        }
    }

    /// Serve a file below the content root. Paths leaving the root are refused.
    fn serve_file(&self, rel: &Path) -> Option<Reply> {
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return None;
        }
        let path = self.source_root.join(rel);
        if !path.is_file() {
            return None;
        }
        let content = std::fs::read(&path).ok()?;
        Some(Reply::data(guess_content_type(&path), content))
    }

    fn not_found(&self, path: &str) -> Reply {
        Reply::html(
            404,
            self.site
                .error_page("Not Found", &format!("Nothing lives at {path}.")),
        )
    }
}

// ============================================================================
// Server Entry Point
// ============================================================================

/// Serve `app` until Ctrl+C.
///
/// Binds to the configured interface and port, retrying the next ports when
/// the port is in use.
pub fn serve_site(
    mut app: SiteApp<'_>,
    interface: &str,
    port: u16,
    mut on_event: impl FnMut(ServeEvent),
) -> Result<(), ServeError> {
    let interface: IpAddr = interface.parse()?;
    let (server, addr) = try_bind_port(interface, port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        server_for_signal.unblock();
    })?;

    on_event(ServeEvent::Listening {
        addr,
        requested_port: (addr.port() != port).then_some(port),
        gated: app.is_gated(),
    });

    for request in server.incoming_requests() {
        let path = request.url().to_string();
        match handle_request(&mut app, request) {
            Ok(event) => on_event(event),
            Err(e) => on_event(ServeEvent::RequestFailed {
                path,
                message: e.to_string(),
            }),
        }
    }

    on_event(ServeEvent::ShuttingDown);
    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr), ServeError> {
    let mut last_error = String::new();
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);
        match Server::http(addr) {
            Ok(server) => return Ok((server, addr)),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(ServeError::Bind {
        attempts: max_retries,
        first: base_port,
        last: base_port.saturating_add(max_retries.saturating_sub(1)),
        message: last_error,
    })
}

fn handle_request(app: &mut SiteApp<'_>, request: Request) -> std::io::Result<ServeEvent> {
    let method = request.method().clone();
    let path = request.url().to_string();

    let reply = match method {
        Method::Get | Method::Head => {
            let cookie = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Cookie"))
                .map(|h| h.value.as_str().to_string());
            app.handle(&path, cookie.as_deref())
        }
        _ => Reply {
            status: 405,
            content_type: "text/plain; charset=utf-8",
            body: b"405 Method Not Allowed".to_vec(),
            location: None,
            set_cookie: None,
        },
    };

    let status = reply.status;
    request.respond(to_response(reply))?;
    Ok(ServeEvent::Request {
        method: method.to_string(),
        path,
        status,
    })
}

fn to_response(reply: Reply) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_data(reply.body).with_status_code(StatusCode(reply.status));
    let headers = [
        Some(("Content-Type", reply.content_type.to_string())),
        reply.location.map(|l| ("Location", l)),
        reply.set_cookie.map(|c| ("Set-Cookie", c)),
    ];
    for (name, value) in headers.into_iter().flatten() {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            response.add_header(header);
        }
    }
    response
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Tests
// ============================================================================
