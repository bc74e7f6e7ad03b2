use serde_json::{json, Value};
use std::{
    io::Read,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::{
    controller::HardLimit,
    error::LimitError,
    gateway::{parse_value, Attr},
};

type Resp = Response<std::io::Cursor<Vec<u8>>>;

fn with_type(resp: Resp, v: &str) -> Resp {
    match Header::from_bytes(&b"Content-Type"[..], v.as_bytes()) {
        Ok(h) => resp.with_header(h),
        Err(_) => resp,
    }
}

fn ok_text(s: String) -> Resp {
    with_type(Response::from_string(s), "text/plain; charset=utf-8")
}

fn ok_json(v: Value) -> Resp {
    with_type(Response::from_string(v.to_string()), "application/json")
}

fn bad(code: u16, msg: &str) -> Resp {
    Response::from_string(msg).with_status_code(StatusCode(code))
}

#[derive(Debug, PartialEq)]
pub enum Reply {
    Text(u16, String),
    Json(Value),
}

impl Reply {
    fn ok(s: String) -> Self {
        Reply::Text(200, s)
    }

    fn err(code: u16, msg: impl Into<String>) -> Self {
        Reply::Text(code, msg.into())
    }

    pub fn code(&self) -> u16 {
        match self {
            Reply::Text(c, _) => *c,
            Reply::Json(_) => 200,
        }
    }

    fn into_response(self) -> Resp {
        match self {
            Reply::Text(200, s) => ok_text(s),
            Reply::Text(code, s) => bad(code, &s),
            Reply::Json(v) => ok_json(v),
        }
    }
}

impl From<LimitError> for Reply {
    fn from(e: LimitError) -> Self {
        Reply::err(e.status_code(), e.to_string())
    }
}

fn read_body(req: &mut tiny_http::Request) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = req.as_reader().read_to_end(&mut buf);
    buf
}

fn build_state_json(hl: &HardLimit) -> Value {
    let s = hl.snapshot();
    json!({
        "state": s.state(),
        "limits": s,
        "kick_pending": hl.kick_pending(),
        "kick_delay_max_ms": hl.kick_delay_max(),
        "available_frequencies": hl.available_frequencies().ok(),
    })
}

/// Routing without the socket, so it can be driven directly.
pub struct Api {
    hl: HardLimit,
    token: String,
    stop: Arc<AtomicBool>,
}

impl Api {
    pub fn new(hl: HardLimit, token: String, stop: Arc<AtomicBool>) -> Self {
        Self { hl, token, stop }
    }

    fn authorized(&self, presented: Option<&str>) -> bool {
        self.token.is_empty() || presented == Some(self.token.as_str())
    }

    pub fn handle(&self, method: &Method, url: &str, token: Option<&str>, body: &[u8]) -> Reply {
        // Same policy as an unknown route: reveal nothing.
        if !self.authorized(token) {
            return Reply::err(404, "");
        }

        let path = url.split('?').next().unwrap_or(url);
        match (method, path) {
            (Method::Get, "/api/state") => Reply::Json(build_state_json(&self.hl)),
            (Method::Post, "/api/stop") => {
                info!("WEB: stop requested");
                self.stop.store(true, Ordering::Release);
                Reply::ok("ok".to_string())
            }
            _ => self.handle_attr(method, path, body),
        }
    }

    fn handle_attr(&self, method: &Method, path: &str, body: &[u8]) -> Reply {
        let Some(rest) = path.strip_prefix("/hardlimit/") else {
            return Reply::err(404, "not found");
        };

        if let Some(freq) = rest.strip_prefix("clamp/") {
            if *method != Method::Get {
                return Reply::err(405, "method not allowed");
            }
            return match parse_value(freq) {
                Ok(f) => Reply::ok(format!("{}\n", self.hl.clamp(f))),
                Err(e) => e.into(),
            };
        }

        let Some(attr) = Attr::from_name(rest) else {
            return Reply::err(404, "not found");
        };

        match method {
            Method::Get => match self.hl.show(attr) {
                Ok(s) => Reply::ok(s),
                Err(e) => e.into(),
            },
            Method::Post | Method::Put => {
                if attr.field().is_none() {
                    return Reply::err(405, format!("{} is read-only", attr.name()));
                }
                let body = String::from_utf8_lossy(body);
                match self.hl.store(attr, &body) {
                    Ok(()) => {
                        debug!("WEB: {} <- {}", attr.name(), body.trim());
                        Reply::ok("ok".to_string())
                    }
                    Err(e) => e.into(),
                }
            }
            _ => Reply::err(405, "method not allowed"),
        }
    }
}

pub fn spawn(api: Api, bind_addr: String) {
    thread::spawn(move || {
        let server = match Server::http(bind_addr.as_str()) {
            Ok(s) => s,
            Err(e) => {
                warn!("WEB: failed to bind {}: {}", bind_addr, e);
                return;
            }
        };
        info!("WEB: http://{}", bind_addr);

        for mut req in server.incoming_requests() {
            let url = req.url().to_string();
            let method = req.method().clone();
            let token = req
                .headers()
                .iter()
                .find(|h| h.field.equiv("X-Api-Token"))
                .map(|h| h.value.as_str().to_string());

            let body = if matches!(method, Method::Post | Method::Put) {
                read_body(&mut req)
            } else {
                Vec::new()
            };

            let reply = api.handle(&method, &url, token.as_deref(), &body);
            if reply.code() != 200 {
                debug!("WEB: {} {} -> {}", method, url, reply.code());
            }
            let _ = req.respond(reply.into_response());
        }
    });
}
