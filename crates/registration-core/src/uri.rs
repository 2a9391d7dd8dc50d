//! SIP URI type and matching rules
//!
//! Contact bindings are keyed by URI, so equality between two URIs has to
//! follow the comparison rules of RFC 3261 Section 19.1.4 rather than plain
//! string equality: the user part is case-sensitive, the host is not, and a
//! handful of "special" URI parameters only match when both sides agree on
//! them. [`SipUri::matches`] implements that subset.
//!
//! The parser accepts the shape carried in Contact and To headers of
//! REGISTER exchanges:
//!
//! ```text
//! sip:user@host:port;param=value;flag
//! ```
//!
//! URI headers (`?key=value`) are not part of registration addressing and
//! are rejected.

use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;

/// URI parameters whose presence on one side only makes two URIs unequal
const SPECIAL_PARAMS: [&str; 5] = ["transport", "user", "method", "ttl", "maddr"];

/// SIP URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// SIP URI (non-secure)
    Sip,
    /// SIPS URI (secure SIP)
    Sips,
}

impl Scheme {
    /// Returns the string representation of the scheme
    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed SIP URI as used in registration addressing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipUri {
    /// URI scheme (`sip` or `sips`)
    pub scheme: Scheme,
    /// Optional user part (case-sensitive)
    pub user: Option<String>,
    /// Host name or address (case-insensitive)
    pub host: String,
    /// Optional explicit port
    pub port: Option<u16>,
    /// URI parameters in order of appearance; `None` values are flag parameters
    pub params: Vec<(String, Option<String>)>,
}

impl SipUri {
    /// Create a plain `sip:` URI with the given host
    pub fn sip(host: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Sip,
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
        }
    }

    /// Set the user part
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set or replace a URI parameter; `None` produces a flag parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        let name = name.into();
        self.params.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.params.push((name, value));
        self
    }

    /// Look up a parameter by name (case-insensitive). The outer `Option`
    /// reports presence; the inner one distinguishes flag parameters.
    pub fn parameter(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref())
    }

    /// Value of a `name=value` parameter, if present
    pub fn parameter_value(&self, name: &str) -> Option<&str> {
        self.parameter(name).flatten()
    }

    /// URI comparison per RFC 3261 Section 19.1.4 (registration subset).
    ///
    /// Scheme, user, host, and port must agree (user comparison is
    /// case-sensitive, host is not, and an explicit port never equals an
    /// absent one). The special parameters `transport`, `user`, `method`,
    /// `ttl`, and `maddr` must either agree or be absent from both URIs;
    /// any other parameter is only compared when both URIs carry it.
    pub fn matches(&self, other: &SipUri) -> bool {
        if self.scheme != other.scheme
            || self.user != other.user
            || !self.host.eq_ignore_ascii_case(&other.host)
            || self.port != other.port
        {
            return false;
        }

        for name in SPECIAL_PARAMS {
            match (self.parameter(name), other.parameter(name)) {
                (None, None) => {}
                (Some(a), Some(b)) if param_values_eq(a, b) => {}
                _ => return false,
            }
        }

        for (name, value) in &self.params {
            if SPECIAL_PARAMS.iter().any(|s| name.eq_ignore_ascii_case(s)) {
                continue;
            }
            if let Some(other_value) = other.parameter(name) {
                if !param_values_eq(value.as_deref(), other_value) {
                    return false;
                }
            }
        }
        true
    }
}

fn param_values_eq(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

impl FromStr for SipUri {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match all_consuming(sip_uri)(s) {
            Ok((_, uri)) => Ok(uri),
            Err(_) => Err(RegistrationError::InvalidUri(s.to_string())),
        }
    }
}

// "sips" must be tried before "sip"
fn scheme(input: &str) -> IResult<&str, Scheme> {
    alt((
        map(tag_no_case("sips"), |_| Scheme::Sips),
        map(tag_no_case("sip"), |_| Scheme::Sip),
    ))(input)
}

fn is_user_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()&=+$,%".contains(c)
}

fn userinfo(input: &str) -> IResult<&str, &str> {
    terminated(
        nom::bytes::complete::take_while1(is_user_char),
        char('@'),
    )(input)
}

fn host(input: &str) -> IResult<&str, &str> {
    alt((
        // bracketed IPv6 reference, kept verbatim
        recognize(delimited(
            char('['),
            nom::bytes::complete::take_while1(|c| c != ']'),
            char(']'),
        )),
        nom::bytes::complete::take_while1(|c: char| {
            c.is_ascii_alphanumeric() || c == '.' || c == '-'
        }),
    ))(input)
}

fn port(input: &str) -> IResult<&str, u16> {
    map_res(digit1, str::parse)(input)
}

fn param_token(input: &str) -> IResult<&str, &str> {
    nom::bytes::complete::take_while1(|c: char| {
        c.is_ascii_alphanumeric() || "-_.!~*'+`%[]:".contains(c)
    })(input)
}

fn uri_param(input: &str) -> IResult<&str, (String, Option<String>)> {
    map(
        pair(param_token, opt(preceded(char('='), param_token))),
        |(name, value)| (name.to_string(), value.map(str::to_string)),
    )(input)
}

fn sip_uri(input: &str) -> IResult<&str, SipUri> {
    map(
        tuple((
            terminated(scheme, char(':')),
            opt(userinfo),
            host,
            opt(preceded(char(':'), port)),
            many0(preceded(char(';'), uri_param)),
        )),
        |(scheme, user, host, port, params)| SipUri {
            scheme,
            user: user.map(str::to_string),
            host: host.to_string(),
            port,
            params,
        },
    )(input)
}
