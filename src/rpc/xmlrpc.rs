//! Just enough XML-RPC to talk to rTorrent.

use std::fmt::Write as _;

use super::error::RpcError;

/// An XML-RPC value.
///
/// `double`, `dateTime.iso8601` and `base64` are kept as their raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlValue {
    Int(i64),
    Bool(bool),
    String(String),
    Array(Vec<XmlValue>),
    Struct(Vec<(String, XmlValue)>),
}

impl XmlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            XmlValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            XmlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Looks up a struct member.
    pub fn member(&self, name: &str) -> Option<&XmlValue> {
        match self {
            XmlValue::Struct(members) => members.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<&str> for XmlValue {
    fn from(s: &str) -> Self {
        XmlValue::String(s.to_string())
    }
}

impl From<String> for XmlValue {
    fn from(s: String) -> Self {
        XmlValue::String(s)
    }
}

impl From<i64> for XmlValue {
    fn from(i: i64) -> Self {
        XmlValue::Int(i)
    }
}

/// Serializes a `methodCall` document.
pub fn encode_call(method: &str, params: &[XmlValue]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    xml.push_str(&escape(method));
    xml.push_str("</methodName><params>");
    for param in params {
        xml.push_str("<param>");
        write_value(&mut xml, param);
        xml.push_str("</param>");
    }
    xml.push_str("</params></methodCall>\n");
    xml
}

fn write_value(out: &mut String, value: &XmlValue) {
    out.push_str("<value>");
    match value {
        XmlValue::Int(i) if i32::try_from(*i).is_ok() => {
            let _ = write!(out, "<i4>{i}</i4>");
        }
        XmlValue::Int(i) => {
            let _ = write!(out, "<i8>{i}</i8>");
        }
        XmlValue::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
        }
        XmlValue::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>");
        }
        XmlValue::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        XmlValue::Struct(members) => {
            out.push_str("<struct>");
            for (name, value) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name));
                out.push_str("</name>");
                write_value(out, value);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

/// Parses a `methodResponse` document.
///
/// A `fault` response is returned as an error, classified by [`RpcError::fault`].
pub fn parse_response(body: &str) -> Result<XmlValue, RpcError> {
    let mut parser = Parser { rest: body };
    parser.skip_prolog();
    parser.open("methodResponse")?;

    let (kind, empty) = parser.open_any()?;
    match kind {
        "params" if empty => Ok(XmlValue::String(String::new())),
        "params" => {
            if parser.peek_close("params") {
                return Ok(XmlValue::String(String::new()));
            }
            parser.open("param")?;
            let value = parser.value()?;
            parser.close("param")?;
            parser.close("params")?;
            Ok(value)
        }
        "fault" => {
            let fault = parser.value()?;
            let code = fault
                .member("faultCode")
                .and_then(XmlValue::as_int)
                .ok_or_else(|| invalid("fault without faultCode"))?;
            let message = fault
                .member("faultString")
                .and_then(XmlValue::as_str)
                .unwrap_or_default();
            Err(RpcError::fault(code, message))
        }
        other => Err(invalid(format!("unexpected <{other}> in response"))),
    }
}

fn invalid(msg: impl Into<String>) -> RpcError {
    RpcError::InvalidResponse(msg.into())
}

struct Parser<'a> {
    rest: &'a str,
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn skip_prolog(&mut self) {
        self.skip_ws();
        if self.rest.starts_with("<?") {
            if let Some(end) = self.rest.find("?>") {
                self.rest = &self.rest[end + 2..];
            }
        }
    }

    fn peek_close(&mut self, name: &str) -> bool {
        self.skip_ws();
        self.rest
            .strip_prefix("</")
            .and_then(|r| r.strip_prefix(name))
            .is_some_and(|r| r.starts_with('>'))
    }

    /// Consumes an opening tag, returning its name and whether it is self-closing.
    fn open_any(&mut self) -> Result<(&'a str, bool), RpcError> {
        self.skip_ws();
        let rest: &'a str = self.rest;
        let tag = rest
            .strip_prefix('<')
            .filter(|r| !r.starts_with('/'))
            .ok_or_else(|| invalid("expected an opening tag"))?;
        let end = tag.find('>').ok_or_else(|| invalid("unterminated tag"))?;
        self.rest = &tag[end + 1..];

        let (inner, empty) = match tag[..end].strip_suffix('/') {
            Some(inner) => (inner, true),
            None => (&tag[..end], false),
        };
        let name = inner.split_whitespace().next().unwrap_or_default();
        Ok((name, empty))
    }

    fn open(&mut self, expected: &str) -> Result<bool, RpcError> {
        let (name, empty) = self.open_any()?;
        if name != expected {
            return Err(invalid(format!("expected <{expected}>, found <{name}>")));
        }
        Ok(empty)
    }

    fn close(&mut self, expected: &str) -> Result<(), RpcError> {
        if !self.peek_close(expected) {
            return Err(invalid(format!("expected </{expected}>")));
        }
        self.rest = &self.rest[expected.len() + 3..];
        Ok(())
    }

    fn text(&mut self) -> String {
        let end = self.rest.find('<').unwrap_or(self.rest.len());
        let raw = &self.rest[..end];
        self.rest = &self.rest[end..];
        unescape(raw)
    }

    fn value(&mut self) -> Result<XmlValue, RpcError> {
        if self.open("value")? {
            return Ok(XmlValue::String(String::new()));
        }

        // untyped content is a string
        let text = self.text();
        if self.rest.starts_with("</value>") {
            self.close("value")?;
            return Ok(XmlValue::String(text));
        }

        let (kind, empty) = self.open_any()?;
        let value = if empty {
            match kind {
                "array" => XmlValue::Array(Vec::new()),
                "struct" => XmlValue::Struct(Vec::new()),
                _ => XmlValue::String(String::new()),
            }
        } else {
            let value = match kind {
                "int" | "i4" | "i8" => {
                    let text = self.text();
                    XmlValue::Int(
                        text.trim()
                            .parse()
                            .map_err(|_| invalid(format!("bad integer {text:?}")))?,
                    )
                }
                "boolean" => XmlValue::Bool(self.text().trim() == "1"),
                "string" => XmlValue::String(self.text()),
                "double" | "dateTime.iso8601" | "base64" => {
                    XmlValue::String(self.text().trim().to_string())
                }
                "array" => self.array()?,
                "struct" => self.members()?,
                other => return Err(invalid(format!("unknown value type <{other}>"))),
            };
            self.close(kind)?;
            value
        };

        self.close("value")?;
        Ok(value)
    }

    fn array(&mut self) -> Result<XmlValue, RpcError> {
        let mut items = Vec::new();
        if self.open("data")? {
            return Ok(XmlValue::Array(items));
        }
        while !self.peek_close("data") {
            items.push(self.value()?);
        }
        self.close("data")?;
        Ok(XmlValue::Array(items))
    }

    fn members(&mut self) -> Result<XmlValue, RpcError> {
        let mut members = Vec::new();
        while !self.peek_close("struct") {
            self.open("member")?;
            self.open("name")?;
            let name = self.text();
            self.close("name")?;
            let value = self.value()?;
            self.close("member")?;
            members.push((name, value));
        }
        Ok(XmlValue::Struct(members))
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        let decoded = rest
            .find(';')
            .and_then(|end| Some((entity(&rest[1..end])?, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            // not a reference we know; keep it verbatim
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = match name.strip_prefix('#')? {
                hex if hex.starts_with(['x', 'X']) => u32::from_str_radix(&hex[1..], 16).ok()?,
                dec => dec.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
