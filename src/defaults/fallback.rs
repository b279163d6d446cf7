//! Recognizer for common default-value constructors that constant folding
//! cannot see through.
//!
//! Each pattern maps a constructor shape to the value a document would carry:
//! string conversions yield the string, network constructors yield their
//! textual address, `Some(x)` and `vec![..]` yield their contents.

use std::net::{Ipv4Addr, Ipv6Addr};

use syn::punctuated::Punctuated;
use syn::{Expr, ExprCall, ExprMethodCall, Token};

use super::{EvalContext, value_of};
use crate::attrs::string_literal;
use crate::classify::{NoTypes, NumericKind, TypeClass};

pub fn recognize(expr: &Expr, cx: &EvalContext<'_>) -> Option<toml::Value> {
    let cx = &cx.deeper()?;
    match expr {
        Expr::Paren(p) => recognize(&p.expr, cx),
        Expr::Group(g) => recognize(&g.expr, cx),
        Expr::MethodCall(call) => method_call(call, cx),
        Expr::Call(call) => function_call(call, cx),
        Expr::Path(p) => {
            let path = path_text(&p.path);
            address_constant(&path).map(toml::Value::String)
        }
        Expr::Macro(m) if m.mac.path.is_ident("vec") => {
            let items = m
                .mac
                .parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated)
                .ok()?;
            items
                .iter()
                .map(|item| value_of(item, cx))
                .collect::<Option<Vec<_>>>()
                .map(toml::Value::Array)
        }
        _ => None,
    }
}

fn method_call(call: &ExprMethodCall, cx: &EvalContext<'_>) -> Option<toml::Value> {
    let method = call.method.to_string();
    match method.as_str() {
        "to_string" | "to_owned" | "into" | "to_path_buf" | "into_owned" | "clone"
            if call.args.is_empty() =>
        {
            value_of(&call.receiver, cx)
        }
        "unwrap" | "expect" => match &*call.receiver {
            Expr::MethodCall(parse) if parse.method == "parse" => {
                let text = string_literal(&parse.receiver)?;
                let target = parse
                    .turbofish
                    .as_ref()
                    .and_then(|t| t.args.first())
                    .map(|arg| quote::ToTokens::to_token_stream(arg).to_string())
                    .or_else(|| cx.return_type.map(String::from));
                Some(parsed(&text, target.as_deref(), cx))
            }
            inner => recognize(inner, cx),
        },
        _ => None,
    }
}

/// `"8080".parse::<u16>()` gives an integer; anything not numeric stays a string.
fn parsed(text: &str, target: Option<&str>, cx: &EvalContext<'_>) -> toml::Value {
    let class = target.map(|ty| cx.classifier.classify(ty, &NoTypes).leaf);
    match class {
        Some(TypeClass::Numeric(NumericKind::Int)) => text
            .parse::<i64>()
            .map(toml::Value::Integer)
            .unwrap_or_else(|_| toml::Value::String(text.to_string())),
        Some(TypeClass::Numeric(NumericKind::Float)) => text
            .parse::<f64>()
            .map(toml::Value::Float)
            .unwrap_or_else(|_| toml::Value::String(text.to_string())),
        Some(TypeClass::Bool) => text
            .parse::<bool>()
            .map(toml::Value::Boolean)
            .unwrap_or_else(|_| toml::Value::String(text.to_string())),
        _ => toml::Value::String(text.to_string()),
    }
}

fn function_call(call: &ExprCall, cx: &EvalContext<'_>) -> Option<toml::Value> {
    let Expr::Path(func) = &*call.func else {
        return None;
    };
    let path = path_text(&func.path);
    let args: Vec<&Expr> = call.args.iter().collect();
    let tail = last_two(&path);

    match (tail.as_str(), args.as_slice()) {
        ("Some", [inner]) => value_of(inner, cx),
        (
            "String::new" | "OsString::new" | "PathBuf::new" | "String::default"
            | "PathBuf::default",
            [],
        ) => {
            Some(toml::Value::String(String::new()))
        }
        (
            "Vec::new" | "VecDeque::new" | "HashSet::new" | "BTreeSet::new" | "Vec::default"
            | "VecDeque::default" | "HashSet::default" | "BTreeSet::default",
            [],
        ) => {
            Some(toml::Value::Array(Vec::new()))
        }
        (
            "HashMap::new" | "BTreeMap::new" | "IndexMap::new" | "HashMap::default"
            | "BTreeMap::default" | "IndexMap::default",
            [],
        ) => {
            Some(toml::Value::Table(toml::Table::new()))
        }
        (
            "String::from" | "PathBuf::from" | "OsString::from" | "Path::new" | "Box::new"
            | "Arc::new" | "Cow::Borrowed" | "Cow::Owned",
            [inner],
        ) => value_of(inner, cx),
        ("Duration::from_secs", [n]) => duration(n, "s", cx),
        ("Duration::from_millis", [n]) => duration(n, "ms", cx),
        ("Duration::from_micros", [n]) => duration(n, "us", cx),
        ("Duration::from_nanos", [n]) => duration(n, "ns", cx),
        (
            "Ipv4Addr::new" | "Ipv6Addr::new" | "IpAddr::V4" | "IpAddr::V6" | "IpAddr::from"
            | "Ipv4Addr::from" | "Ipv6Addr::from",
            _,
        ) => ip_text(expr_of(call), cx).map(toml::Value::String),
        (
            "SocketAddr::from" | "SocketAddr::new" | "SocketAddrV4::new" | "SocketAddrV6::new",
            _,
        ) => socket_text(&tail, &args, cx).map(toml::Value::String),
        _ => None,
    }
}

fn expr_of(call: &ExprCall) -> Expr {
    Expr::Call(call.clone())
}

fn duration(n: &Expr, unit: &str, cx: &EvalContext<'_>) -> Option<toml::Value> {
    let toml::Value::Integer(n) = value_of(n, cx)? else {
        return None;
    };
    Some(toml::Value::String(format!("{n}{unit}")))
}

/// Textual form of an IP address expression.
fn ip_text(expr: Expr, cx: &EvalContext<'_>) -> Option<String> {
    match expr {
        Expr::Paren(p) => ip_text(*p.expr, cx),
        Expr::Path(p) => address_constant(&path_text(&p.path)),
        Expr::Array(_) => match value_of(&expr, cx)? {
            toml::Value::Array(octets) => octets_text(&octets),
            _ => None,
        },
        Expr::Lit(_) => match value_of(&expr, cx)? {
            toml::Value::String(s) => Some(s),
            _ => None,
        },
        Expr::Call(call) => {
            let Expr::Path(func) = &*call.func else {
                return None;
            };
            let path = path_text(&func.path);
            let args: Vec<Expr> = call.args.into_iter().collect();
            match (last_two(&path).as_str(), args.as_slice()) {
                ("IpAddr::V4" | "IpAddr::V6" | "IpAddr::from" | "Ipv4Addr::from" | "Ipv6Addr::from", [inner]) => {
                    ip_text(inner.clone(), cx)
                }
                ("Ipv4Addr::new", [_, _, _, _]) | ("Ipv6Addr::new", [_, _, _, _, _, _, _, _]) => {
                    let parts = args
                        .iter()
                        .map(|a| match value_of(a, cx)? {
                            toml::Value::Integer(i) => Some(toml::Value::Integer(i)),
                            _ => None,
                        })
                        .collect::<Option<Vec<_>>>()?;
                    octets_text(&parts)
                }
                _ => None,
            }
        }
        _ => match recognize(&expr, cx)? {
            toml::Value::String(s) => Some(s),
            _ => None,
        },
    }
}

/// Four parts make an IPv4 address, eight an IPv6 one.
fn octets_text(parts: &[toml::Value]) -> Option<String> {
    let ints = parts
        .iter()
        .map(|v| v.as_integer())
        .collect::<Option<Vec<i64>>>()?;
    match ints.as_slice() {
        [a, b, c, d] => {
            let octet = |v: &i64| u8::try_from(*v).ok();
            Some(Ipv4Addr::new(octet(a)?, octet(b)?, octet(c)?, octet(d)?).to_string())
        }
        [_, _, _, _, _, _, _, _] => {
            let segments = ints
                .iter()
                .map(|v| u16::try_from(*v).ok())
                .collect::<Option<Vec<u16>>>()?;
            let segments: [u16; 8] = segments.try_into().ok()?;
            Some(Ipv6Addr::from(segments).to_string())
        }
        _ => None,
    }
}

fn socket_text(tail: &str, args: &[&Expr], cx: &EvalContext<'_>) -> Option<String> {
    let (ip, port) = match (tail, args) {
        ("SocketAddr::from", [Expr::Tuple(pair)]) if pair.elems.len() == 2 => {
            let mut elems = pair.elems.iter();
            (elems.next()?, elems.next()?)
        }
        ("SocketAddr::from", [Expr::Paren(p)]) => return socket_text(tail, &[&*p.expr], cx),
        ("SocketAddr::new" | "SocketAddrV4::new", [ip, port]) => (*ip, *port),
        ("SocketAddrV6::new", [ip, port, _, _]) => (*ip, *port),
        _ => return None,
    };
    let ip = ip_text(ip.clone(), cx)?;
    let toml::Value::Integer(port) = value_of(port, cx)? else {
        return None;
    };
    let port = u16::try_from(port).ok()?;
    if ip.contains(':') {
        Some(format!("[{ip}]:{port}"))
    } else {
        Some(format!("{ip}:{port}"))
    }
}

fn address_constant(path: &str) -> Option<String> {
    let text = match last_two(path).as_str() {
        "Ipv4Addr::LOCALHOST" => "127.0.0.1",
        "Ipv4Addr::UNSPECIFIED" => "0.0.0.0",
        "Ipv4Addr::BROADCAST" => "255.255.255.255",
        "Ipv6Addr::LOCALHOST" => "::1",
        "Ipv6Addr::UNSPECIFIED" => "::",
        "Duration::ZERO" => "0s",
        _ => return None,
    };
    Some(text.to_string())
}

fn path_text(path: &syn::Path) -> String {
    path.segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect::<Vec<_>>()
        .join("::")
}

/// `std::net::Ipv4Addr::new` gives `Ipv4Addr::new`.
fn last_two(path: &str) -> String {
    let segments: Vec<&str> = path.rsplitn(3, "::").collect();
    match segments.as_slice() {
        [name, owner, ..] => format!("{owner}::{name}"),
        [name] => name.to_string(),
        [] => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::fixtures::test::sample_index;

    fn value(text: &str, return_type: Option<&str>) -> Option<toml::Value> {
        let index = sample_index();
        let classifier = crate::fixtures::test::classifier();
        let cx = EvalContext {
            index: &index,
            classifier: &classifier,
            crate_name: "app",
            owner: None,
            return_type,
            depth: 0,
        };
        value_of(&syn::parse_str::<Expr>(text).unwrap(), &cx)
    }

    fn string(text: &str) -> Option<String> {
        match value(text, None)? {
            toml::Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[test]
    fn string_conversions() {
        assert_eq!(string("\"a\".to_string()").as_deref(), Some("a"));
        assert_eq!(string("\"a\".to_owned()").as_deref(), Some("a"));
        assert_eq!(string("\"a\".into()").as_deref(), Some("a"));
        assert_eq!(string("String::from(\"a\")").as_deref(), Some("a"));
        assert_eq!(string("String::new()").as_deref(), Some(""));
        assert_eq!(string("PathBuf::from(\"/etc/app\")").as_deref(), Some("/etc/app"));
        assert_eq!(
            string("std::path::Path::new(\"/var\").to_path_buf()").as_deref(),
            Some("/var")
        );
    }

    #[test]
    fn parse_unwrap_uses_target_type() {
        assert_eq!(
            value("\"8080\".parse::<u16>().unwrap()", None),
            Some(toml::Value::Integer(8080))
        );
        assert_eq!(
            value("\"8080\".parse().unwrap()", Some("u16")),
            Some(toml::Value::Integer(8080))
        );
        assert_eq!(
            string("\"127.0.0.1\".parse().expect(\"valid\")").as_deref(),
            Some("127.0.0.1")
        );
    }

    #[test]
    fn ip_addresses() {
        assert_eq!(string("Ipv4Addr::new(10, 0, 0, 1)").as_deref(), Some("10.0.0.1"));
        assert_eq!(string("Ipv4Addr::LOCALHOST").as_deref(), Some("127.0.0.1"));
        assert_eq!(string("std::net::Ipv4Addr::UNSPECIFIED").as_deref(), Some("0.0.0.0"));
        assert_eq!(string("Ipv6Addr::LOCALHOST").as_deref(), Some("::1"));
        assert_eq!(
            string("IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1))").as_deref(),
            Some("192.168.0.1")
        );
        assert_eq!(string("IpAddr::from([10, 1, 2, 3])").as_deref(), Some("10.1.2.3"));
        assert_eq!(string("Ipv4Addr::new(300, 0, 0, 1)"), None);
    }

    #[test]
    fn socket_addresses() {
        assert_eq!(
            string("SocketAddr::from(([0, 0, 0, 0], 8080))").as_deref(),
            Some("0.0.0.0:8080")
        );
        assert_eq!(
            string("SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000)").as_deref(),
            Some("127.0.0.1:3000")
        );
        assert_eq!(
            string("SocketAddr::new(Ipv6Addr::LOCALHOST.into(), 443)").as_deref(),
            Some("[::1]:443")
        );
    }

    #[test]
    fn containers() {
        assert_eq!(value("Some(5)", None), Some(toml::Value::Integer(5)));
        assert_eq!(
            value("vec![\"a\".to_string(), \"b\".into()]", None),
            Some(toml::Value::Array(vec![
                toml::Value::String("a".into()),
                toml::Value::String("b".into()),
            ]))
        );
        assert_eq!(value("Vec::new()", None), Some(toml::Value::Array(vec![])));
        assert_eq!(
            value("HashMap::new()", None),
            Some(toml::Value::Table(toml::Table::new()))
        );
    }

    #[test]
    fn durations() {
        assert_eq!(string("Duration::from_secs(30)").as_deref(), Some("30s"));
        assert_eq!(string("Duration::from_millis(60 * 1000)").as_deref(), Some("60000ms"));
        assert_eq!(string("Duration::ZERO").as_deref(), Some("0s"));
    }

    #[test]
    fn unrecognized_shapes() {
        assert_eq!(value("std::env::var(\"HOST\").unwrap_or_default()", None), None);
        assert_eq!(value("compute()", None), None);
        assert_eq!(value("None", None), None);
    }

    #[test]
    fn last_two_segments() {
        assert_eq!(last_two("std::net::Ipv4Addr::new"), "Ipv4Addr::new");
        assert_eq!(last_two("Some"), "Some");
    }
}
