//! Compile-time constant folding over `syn` expressions.

use syn::{BinOp, Expr, Lit, UnOp};

use super::EvalContext;
use crate::attrs::{result_expr, type_name};
use crate::classify::{NumericKind, TypeClass};

/// A folded constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i128),
    Float(f64),
    Bool(bool),
    Str(String),
    Array(Vec<Const>),
}

impl Const {
    /// `None` for integers outside the TOML range.
    pub fn into_value(self) -> Option<toml::Value> {
        let value = match self {
            Self::Int(i) => toml::Value::Integer(i64::try_from(i).ok()?),
            Self::Float(f) => toml::Value::Float(f),
            Self::Bool(b) => toml::Value::Boolean(b),
            Self::Str(s) => toml::Value::String(s),
            Self::Array(items) => toml::Value::Array(
                items
                    .into_iter()
                    .map(Const::into_value)
                    .collect::<Option<_>>()?,
            ),
        };
        Some(value)
    }
}

/// Width of a primitive integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntWidth {
    pub bits: u32,
    pub signed: bool,
}

impl IntWidth {
    pub fn of(name: &str) -> Option<Self> {
        let (signed, bits) = match name {
            "u8" => (false, 8),
            "u16" => (false, 16),
            "u32" => (false, 32),
            "u64" | "usize" => (false, 64),
            "u128" => (false, 128),
            "i8" => (true, 8),
            "i16" => (true, 16),
            "i32" => (true, 32),
            "i64" | "isize" => (true, 64),
            "i128" => (true, 128),
            _ => return None,
        };
        Some(Self { bits, signed })
    }

    /// Two's complement truncation, as `as` does between integers.
    /// `u128` values above `i128::MAX` are not representable and yield `None`.
    fn wrap(self, value: i128) -> Option<i128> {
        if self.bits == 128 {
            return (self.signed || value >= 0).then_some(value);
        }
        let modulus = 1i128 << self.bits;
        let low = value.rem_euclid(modulus);
        if self.signed && low >= modulus / 2 {
            Some(low - modulus)
        } else {
            Some(low)
        }
    }

    fn min(self) -> i128 {
        if self.signed {
            -(1i128 << (self.bits - 1))
        } else {
            0
        }
    }

    fn max(self) -> i128 {
        match (self.signed, self.bits) {
            (_, 128) => i128::MAX,
            (true, bits) => (1i128 << (bits - 1)) - 1,
            (false, bits) => (1i128 << bits) - 1,
        }
    }
}

/// Fold `expr`. Integer results are interpreted at the width of the declared
/// return type (or its element type) when there is one.
pub fn fold(expr: &Expr, cx: &EvalContext<'_>) -> Option<Const> {
    let expected = cx
        .return_type
        .and_then(|ty| IntWidth::of(&cx.classifier.unwrap(ty).1));
    fold_as(expr, cx, expected)
}

fn fold_as(expr: &Expr, cx: &EvalContext<'_>, width: Option<IntWidth>) -> Option<Const> {
    let fold = |e: &Expr| fold_as(e, cx, width);
    match expr {
        Expr::Lit(lit) => literal(&lit.lit),
        Expr::Paren(p) => fold(&p.expr),
        Expr::Group(g) => fold(&g.expr),
        Expr::Reference(r) => fold(&r.expr),
        Expr::Return(r) => fold(r.expr.as_deref()?),
        Expr::Block(b) => fold(result_expr(&b.block.stmts)?),
        Expr::Const(c) => fold(result_expr(&c.block.stmts)?),
        Expr::Unsafe(u) => fold(result_expr(&u.block.stmts)?),
        Expr::Unary(u) => {
            let width = literal_width(&u.expr).or(width);
            unary(&u.op, fold_as(&u.expr, cx, width)?, width)
        }
        Expr::Binary(b) => binary(&b.op, fold(&b.left)?, fold(&b.right)?),
        Expr::Cast(c) => {
            let source = literal_width(&c.expr);
            cast(fold_as(&c.expr, cx, source)?, &type_name(&c.ty)?, cx)
        }
        Expr::Array(a) => a
            .elems
            .iter()
            .map(fold)
            .collect::<Option<_>>()
            .map(Const::Array),
        Expr::Repeat(r) => {
            let item = fold(&r.expr)?;
            let Const::Int(len) = fold_as(&r.len, cx, None)? else {
                return None;
            };
            let len = usize::try_from(len).ok().filter(|n| *n <= 4096)?;
            Some(Const::Array(vec![item; len]))
        }
        Expr::Path(p) => {
            let segments: Vec<String> = p
                .path
                .segments
                .iter()
                .map(|s| s.ident.to_string())
                .collect();
            path_constant(&segments, cx)
        }
        _ => None,
    }
}

/// Width given by an integer literal suffix such as `0u32`.
fn literal_width(expr: &Expr) -> Option<IntWidth> {
    match expr {
        Expr::Lit(syn::ExprLit { lit: Lit::Int(i), .. }) => IntWidth::of(i.suffix()),
        Expr::Paren(p) => literal_width(&p.expr),
        Expr::Unary(u) => literal_width(&u.expr),
        _ => None,
    }
}

fn literal(lit: &Lit) -> Option<Const> {
    match lit {
        Lit::Int(i) => i.base10_parse::<i128>().ok().map(Const::Int),
        Lit::Float(f) => f.base10_parse::<f64>().ok().map(Const::Float),
        Lit::Bool(b) => Some(Const::Bool(b.value)),
        Lit::Str(s) => Some(Const::Str(s.value())),
        Lit::Char(c) => Some(Const::Str(c.value().to_string())),
        Lit::Byte(b) => Some(Const::Int(i128::from(b.value()))),
        _ => None,
    }
}

/// Bitwise `!` on an integer depends on its width; without one there is no value.
fn unary(op: &UnOp, value: Const, width: Option<IntWidth>) -> Option<Const> {
    match (op, value) {
        (UnOp::Neg(_), Const::Int(i)) => i.checked_neg().map(Const::Int),
        (UnOp::Neg(_), Const::Float(f)) => Some(Const::Float(-f)),
        (UnOp::Not(_), Const::Bool(b)) => Some(Const::Bool(!b)),
        (UnOp::Not(_), Const::Int(i)) => width?.wrap(!i).map(Const::Int),
        _ => None,
    }
}

fn binary(op: &BinOp, left: Const, right: Const) -> Option<Const> {
    use Const::{Bool, Float, Int};

    let folded = match (left, right) {
        (Int(a), Int(b)) => match op {
            BinOp::Add(_) => Int(a.checked_add(b)?),
            BinOp::Sub(_) => Int(a.checked_sub(b)?),
            BinOp::Mul(_) => Int(a.checked_mul(b)?),
            BinOp::Div(_) => Int(a.checked_div(b)?),
            BinOp::Rem(_) => Int(a.checked_rem(b)?),
            BinOp::BitAnd(_) => Int(a & b),
            BinOp::BitOr(_) => Int(a | b),
            BinOp::BitXor(_) => Int(a ^ b),
            BinOp::Shl(_) => Int(a.checked_shl(u32::try_from(b).ok()?)?),
            BinOp::Shr(_) => Int(a.checked_shr(u32::try_from(b).ok()?)?),
            _ => Bool(compare(op, a.partial_cmp(&b)?)?),
        },
        (Float(a), Float(b)) => match op {
            BinOp::Add(_) => Float(a + b),
            BinOp::Sub(_) => Float(a - b),
            BinOp::Mul(_) => Float(a * b),
            BinOp::Div(_) => Float(a / b),
            BinOp::Rem(_) => Float(a % b),
            _ => Bool(compare(op, a.partial_cmp(&b)?)?),
        },
        (Bool(a), Bool(b)) => match op {
            BinOp::And(_) => Bool(a && b),
            BinOp::Or(_) => Bool(a || b),
            BinOp::BitAnd(_) => Bool(a & b),
            BinOp::BitOr(_) => Bool(a | b),
            BinOp::BitXor(_) => Bool(a ^ b),
            _ => Bool(compare(op, a.cmp(&b))?),
        },
        _ => return None,
    };
    Some(folded)
}

fn compare(op: &BinOp, ordering: std::cmp::Ordering) -> Option<bool> {
    use std::cmp::Ordering::{Equal, Greater, Less};

    let result = match op {
        BinOp::Eq(_) => ordering == Equal,
        BinOp::Ne(_) => ordering != Equal,
        BinOp::Lt(_) => ordering == Less,
        BinOp::Le(_) => ordering != Greater,
        BinOp::Gt(_) => ordering == Greater,
        BinOp::Ge(_) => ordering != Less,
        _ => return None,
    };
    Some(result)
}

fn cast(value: Const, target: &str, cx: &EvalContext<'_>) -> Option<Const> {
    if let Some(width) = IntWidth::of(target) {
        return match value {
            Const::Int(i) => width.wrap(i).map(Const::Int),
            Const::Float(f) if f.is_nan() => Some(Const::Int(0)),
            Const::Float(f) => {
                let truncated = f.trunc();
                let clamped = if truncated <= width.min() as f64 {
                    width.min()
                } else if truncated >= width.max() as f64 {
                    width.max()
                } else {
                    truncated as i128
                };
                Some(Const::Int(clamped))
            }
            Const::Bool(b) => Some(Const::Int(i128::from(b))),
            _ => None,
        };
    }
    let class = cx
        .classifier
        .classify(target, &crate::classify::NoTypes)
        .class;
    match (value, class) {
        (Const::Int(i), TypeClass::Numeric(NumericKind::Float)) => Some(Const::Float(i as f64)),
        (Const::Float(f), TypeClass::Numeric(NumericKind::Float)) => Some(Const::Float(f)),
        _ => None,
    }
}

/// `NAME`, `Self::NAME`, `Type::NAME`, or a primitive bound such as `u16::MAX`.
fn path_constant(segments: &[String], cx: &EvalContext<'_>) -> Option<Const> {
    let (name, owner) = match segments {
        [name] => (name.as_str(), None),
        [.., owner, name] => (name.as_str(), Some(owner.as_str())),
        [] => return None,
    };
    if let Some(bound) = owner.and_then(|ty| primitive_bound(ty, name)) {
        return Some(bound);
    }

    let owner = match owner {
        Some("Self") => cx.owner,
        other => other,
    };
    let candidates: Vec<_> = cx
        .index
        .consts(name)
        .iter()
        .filter(|c| c.crate_name == cx.crate_name)
        .collect();
    let constant = candidates
        .iter()
        .find(|c| owner.is_some() && c.owner.as_deref() == owner)
        .or_else(|| candidates.iter().find(|c| c.owner.is_none()))?;

    let deeper = EvalContext {
        return_type: Some(constant.ty.as_str()),
        ..cx.deeper()?
    };
    let expr = syn::parse_str::<Expr>(&constant.value).ok()?;
    fold(&expr, &deeper)
}

fn primitive_bound(ty: &str, name: &str) -> Option<Const> {
    macro_rules! bounds {
        ($($t:ident),*) => {
            match (ty, name) {
                $(
                    (stringify!($t), "MAX") => Some(Const::Int(i128::try_from($t::MAX).ok()?)),
                    (stringify!($t), "MIN") => Some(Const::Int(i128::try_from($t::MIN).ok()?)),
                )*
                ("f32", "MAX") => Some(Const::Float(f64::from(f32::MAX))),
                ("f64", "MAX") => Some(Const::Float(f64::MAX)),
                _ => None,
            }
        };
    }
    bounds!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::fixtures::test::sample_index;
    use crate::index::TypeIndex;

    fn fold_text(index: &TypeIndex, text: &str) -> Option<Const> {
        let classifier = crate::fixtures::test::classifier();
        let cx = EvalContext {
            index,
            classifier: &classifier,
            crate_name: "app",
            owner: Some("WebConfig"),
            return_type: None,
            depth: 0,
        };
        fold(&syn::parse_str::<Expr>(text).unwrap(), &cx)
    }

    fn folds_to(text: &str) -> Option<Const> {
        fold_text(&sample_index(), text)
    }

    #[test]
    fn literals() {
        assert_eq!(folds_to("42"), Some(Const::Int(42)));
        assert_eq!(folds_to("1_000u32"), Some(Const::Int(1000)));
        assert_eq!(folds_to("0.5"), Some(Const::Float(0.5)));
        assert_eq!(folds_to("true"), Some(Const::Bool(true)));
        assert_eq!(folds_to("\"x\""), Some(Const::Str("x".into())));
        assert_eq!(folds_to("'c'"), Some(Const::Str("c".into())));
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(folds_to("60 * 60 + 5"), Some(Const::Int(3605)));
        assert_eq!(folds_to("(1 + 2) * 3"), Some(Const::Int(9)));
        assert_eq!(folds_to("-(4 - 10)"), Some(Const::Int(6)));
        assert_eq!(folds_to("1 << 10"), Some(Const::Int(1024)));
        assert_eq!(folds_to("1.5 * 2.0"), Some(Const::Float(3.0)));
    }

    #[test]
    fn boolean_logic_and_comparison() {
        assert_eq!(folds_to("true && !false"), Some(Const::Bool(true)));
        assert_eq!(folds_to("3 > 4 || 2 == 2"), Some(Const::Bool(true)));
    }

    #[test]
    fn invalid_arithmetic_does_not_fold() {
        assert_eq!(folds_to("1 / 0"), None);
        assert_eq!(folds_to("1 + 1.0"), None);
        assert_eq!(folds_to("\"a\" + \"b\""), None);
    }

    #[test]
    fn casts() {
        assert_eq!(folds_to("7 as f64"), Some(Const::Float(7.0)));
        assert_eq!(folds_to("2.9 as u8"), Some(Const::Int(2)));
        assert_eq!(folds_to("true as u8"), Some(Const::Int(1)));
    }

    #[test]
    fn integer_casts_truncate_to_target_width() {
        assert_eq!(folds_to("300 as u8"), Some(Const::Int(44)));
        assert_eq!(folds_to("-1i32 as u32"), Some(Const::Int(4_294_967_295)));
        assert_eq!(folds_to("-1 as u8"), Some(Const::Int(255)));
        assert_eq!(folds_to("200u8 as i8"), Some(Const::Int(-56)));
        assert_eq!(folds_to("1e10 as u16"), Some(Const::Int(65535)));
        assert_eq!(folds_to("-3.5 as u8"), Some(Const::Int(0)));
    }

    #[test]
    fn bitwise_not_needs_a_width() {
        assert_eq!(folds_to("!0"), None);
        assert_eq!(folds_to("!0u8"), Some(Const::Int(255)));
        assert_eq!(folds_to("!0i32"), Some(Const::Int(-1)));
        assert_eq!(folds_to("!0u16 as u32"), Some(Const::Int(65535)));
    }

    #[test]
    fn return_type_gives_the_width() {
        let index = sample_index();
        let classifier = crate::fixtures::test::classifier();
        let cx = EvalContext {
            index: &index,
            classifier: &classifier,
            crate_name: "app",
            owner: None,
            return_type: Some("u32"),
            depth: 0,
        };
        let expr = syn::parse_str::<Expr>("!0").unwrap();
        assert_eq!(fold(&expr, &cx), Some(Const::Int(4_294_967_295)));
        let masked = syn::parse_str::<Expr>("!0 & 0xFF00").unwrap();
        assert_eq!(fold(&masked, &cx), Some(Const::Int(0xFF00)));
    }

    #[test]
    fn blocks_and_arrays() {
        assert_eq!(folds_to("{ 2 + 2 }"), Some(Const::Int(4)));
        assert_eq!(
            folds_to("[1, 2]"),
            Some(Const::Array(vec![Const::Int(1), Const::Int(2)]))
        );
        assert_eq!(
            folds_to("[0; 2]"),
            Some(Const::Array(vec![Const::Int(0), Const::Int(0)]))
        );
    }

    #[test]
    fn const_items_are_followed() {
        assert_eq!(folds_to("BASE_TIMEOUT"), Some(Const::Int(60)));
        assert_eq!(folds_to("BASE_TIMEOUT * 2"), Some(Const::Int(120)));
        assert_eq!(folds_to("Self::MAX_WORKERS"), Some(Const::Int(16)));
        assert_eq!(folds_to("WebConfig::MAX_WORKERS"), Some(Const::Int(16)));
    }

    #[test]
    fn primitive_bounds() {
        assert_eq!(folds_to("u16::MAX"), Some(Const::Int(65535)));
        assert_eq!(folds_to("i8::MIN"), Some(Const::Int(-128)));
    }

    #[test]
    fn cyclic_consts_stop() {
        assert_eq!(folds_to("LOOP_A"), None);
    }

    #[test]
    fn out_of_range_integers_have_no_value() {
        assert_eq!(Const::Int(i128::MAX).into_value(), None);
        assert_eq!(Const::Int(5).into_value(), Some(toml::Value::Integer(5)));
    }
}
