//! Fixed-shape multistatus body for the ctag poll path.
//!
//! The poll path never builds a general WebDAV response. It answers with one
//! `<response>` carrying the collection's `getctag` and a status line:
//!
//! ```text
//! <multistatus xmlns="DAV:" xmlns:C="http://calendarserver.org/ns/">
//!   <response>
//!     <href>/caldav.php/alice/alice</href>
//!     <propstat>
//!       <prop><C:getctag>"3f2a..."</C:getctag></prop>
//!       <status>HTTP/1.1 200 OK</status>
//!     </propstat>
//!   </response>
//! </multistatus>
//! ```
//!
//! (whitespace added for readability, the body is emitted on one line).

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Calendarserver extension namespace carrying `getctag`.
pub const CALENDARSERVER_NS: &str = "http://calendarserver.org/ns/";

/// Content type of the poll response.
pub const CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// Ctag value reported for any failure on the poll path.
pub const ERROR_CTAG: &str = "ERROR_CTAG";

/// Status reported by the poll path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtagStatus {
    /// 200 OK.
    Ok,
    /// 404 Not Found.
    NotFound,
}

impl CtagStatus {
    /// Returns the HTTP status code.
    pub fn code(&self) -> u16 {
        match self {
            CtagStatus::Ok => 200,
            CtagStatus::NotFound => 404,
        }
    }

    /// Returns the HTTP reason phrase.
    pub fn reason(&self) -> &'static str {
        match self {
            CtagStatus::Ok => "OK",
            CtagStatus::NotFound => "Not Found",
        }
    }
}

/// A complete poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtagResponse {
    /// Response status.
    pub status: CtagStatus,
    /// Request URI echoed in `<href>`.
    pub href: String,
    /// Reported ctag (unquoted).
    pub ctag: String,
}

impl CtagResponse {
    /// Creates a successful response.
    pub fn success(href: impl Into<String>, ctag: impl Into<String>) -> Self {
        Self {
            status: CtagStatus::Ok,
            href: href.into(),
            ctag: ctag.into(),
        }
    }

    /// Creates the degraded response used for every failure.
    pub fn error(href: impl Into<String>) -> Self {
        Self {
            status: CtagStatus::NotFound,
            href: href.into(),
            ctag: ERROR_CTAG.to_string(),
        }
    }

    /// Returns true for a 200 response.
    pub fn is_success(&self) -> bool {
        self.status == CtagStatus::Ok
    }

    /// Returns the HTTP status line, e.g. `HTTP/1.1 200 OK`.
    pub fn status_line(&self) -> String {
        format!(
            "HTTP/1.1 {} {}",
            self.status.code(),
            self.status.reason()
        )
    }

    /// Renders the XML body.
    pub fn body(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\
             <multistatus xmlns=\"DAV:\" xmlns:C=\"{ns}\">\
             <response><href>{href}</href>\
             <propstat><prop><C:getctag>\"{ctag}\"</C:getctag></prop>\
             <status>{status}</status></propstat>\
             </response></multistatus>",
            ns = CALENDARSERVER_NS,
            href = escape(self.href.as_str()),
            ctag = escape(self.ctag.as_str()),
            status = self.status_line(),
        )
    }

    /// Returns the response headers set directly by the poll path.
    pub fn headers(&self, body: &str) -> Vec<(&'static str, String)> {
        vec![
            ("Content-Type", CONTENT_TYPE.to_string()),
            ("Content-Length", body.len().to_string()),
        ]
    }
}

/// Returns true if the request is a `PROPFIND` asking for `getctag` alone.
///
/// Every `prop` element of the body must request exactly one property,
/// `getctag`, in any namespace prefix and as either `<getctag/>` or
/// `<getctag></getctag>`. Comments and whitespace are ignored. Malformed XML
/// is not a poll.
pub fn is_ctag_only_propfind(method: &str, body: &str) -> bool {
    if !method.eq_ignore_ascii_case("PROPFIND") {
        return false;
    }

    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    // Depth of the open `prop` element and what it requested so far
    let mut prop_depth: Option<usize> = None;
    let mut requested = 0usize;
    let mut requested_ctag = false;
    let mut found = false;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(_) => return false,
        };
        match event {
            Event::Start(e) => {
                depth += 1;
                let is_ctag = e.local_name().as_ref() == b"getctag";
                match prop_depth {
                    None if e.local_name().as_ref() == b"prop" => {
                        prop_depth = Some(depth);
                        requested = 0;
                        requested_ctag = false;
                    }
                    Some(prop) if depth == prop + 1 => {
                        requested += 1;
                        requested_ctag |= is_ctag;
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if prop_depth == Some(depth) {
                    requested += 1;
                    requested_ctag |= e.local_name().as_ref() == b"getctag";
                }
            }
            Event::End(_) => {
                if prop_depth == Some(depth) {
                    if requested != 1 || !requested_ctag {
                        return false;
                    }
                    found = true;
                    prop_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    found && prop_depth.is_none()
}
