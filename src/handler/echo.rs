use std::fmt::Write;

use super::{Handler, HandlerError};
use crate::config::HostConfig;
use crate::http::message::{Message, Record};
use crate::http::response::StatusCode;

/// Replies `200 text/plain` with a dump of the parsed request.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    fn handle(
        &self,
        host: &HostConfig,
        request: &Message,
        response: &mut Message,
    ) -> Result<(), HandlerError> {
        let mut out = String::new();
        render(&mut out, host, request)
            .map_err(|e| HandlerError::Failed(format!("echo: {}", e)))?;

        response.set_status(StatusCode::Ok);
        response.set_content_type("text/plain");
        response.set_body(out);
        Ok(())
    }
}

fn render(out: &mut String, host: &HostConfig, request: &Message) -> std::fmt::Result {
    let method = request.method.map(|m| m.as_str()).unwrap_or("-");
    let version = request.version.map(|v| v.as_str()).unwrap_or("-");
    writeln!(out, "{} {} {}", method, request.path, version)?;
    writeln!(out, "host: {}", host.name)?;

    writeln!(out, "\n[url]")?;
    for record in &request.url {
        write_record(out, record, "=")?;
    }

    writeln!(out, "\n[headers]")?;
    for record in &request.headers {
        write_record(out, record, ": ")?;
    }

    writeln!(out, "\n[body]")?;
    for record in &request.body {
        match &record.part {
            Some(part) => writeln!(
                out,
                "{} ({} bytes, type={}, filename={})",
                record.name,
                record.size(),
                part.content_type.as_deref().unwrap_or("-"),
                part.filename.as_deref().unwrap_or("-"),
            )?,
            None => write_record(out, record, "=")?,
        }
    }
    Ok(())
}

fn write_record(out: &mut String, record: &Record, sep: &str) -> std::fmt::Result {
    match record.value_str() {
        Some(value) => writeln!(out, "{}{}{}", record.name, sep, value),
        None => writeln!(out, "{}{}<{} bytes>", record.name, sep, record.size()),
    }
}
