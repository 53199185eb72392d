//! Abstraction over one in-flight HTTP request/response pair.

use std::net::Ipv4Addr;

use http::StatusCode;

/// What the portal controller needs from the web server: submitted
/// form fields, a couple of request attributes, and response emission.
/// The embedding binary implements this over its real HTTP server;
/// [`crate::mock::MockRequest`] implements it for tests and
/// simulation.
///
/// Emission methods return `anyhow::Result` so transport failures can
/// surface from the embedder; the controller itself never produces
/// errors of its own through them.
pub trait WebRequest {
    fn has_field(&self, name: &str) -> bool;
    fn field_value(&self, name: &str) -> String;

    /// Value of the Host header, without scheme.
    fn host_header(&self) -> String;

    /// Request path, used for the not-found page.
    fn uri(&self) -> String;

    /// Device-side address of the connection. Captive-portal redirects
    /// point the client here.
    fn local_ip(&self) -> Ipv4Addr;

    /// HTTP Basic auth check, pass-through to the server.
    fn authenticate(&mut self, username: &str, password: &str) -> bool;

    /// Emit an authentication challenge.
    fn request_authentication(&mut self);

    fn send_header(&mut self, name: &str, value: &str);

    /// Send status line, content type and (possibly empty) body. An
    /// empty body starts a chunked response continued with
    /// [`WebRequest::send_content`].
    fn send(&mut self, status: StatusCode, content_type: &str, body: &str) -> anyhow::Result<()>;

    /// Append a chunk to a response started with an empty body.
    fn send_content(&mut self, chunk: &str) -> anyhow::Result<()>;

    /// Close the connection. Needed after responses sent without a
    /// content length.
    fn stop(&mut self);
}
