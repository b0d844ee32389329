//! Host-side representation of values that cross the script boundary.

use std::collections::HashMap;
use std::fmt;

use super::bridge::HostFunction;
use crate::core::BoxError;

/// 脚本值 - 宿主侧的通用数据类型
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ScriptValue {
    /// 无值（脚本未产生结果）
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ScriptValue>),
    Object(HashMap<String, ScriptValue>),
    /// 宿主函数桥
    Function(HostFunction),
    /// 无法复制到宿主侧的脚本值，只保留描述
    Opaque(String),
}

impl ScriptValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, ScriptValue::Undefined)
    }

    /// undefined 或 null
    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            ScriptValue::Function(f) => Some(f),
            _ => None,
        }
    }

    /// 类型名，用于诊断信息
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Array(_) => "array",
            ScriptValue::Object(_) => "object",
            ScriptValue::Function(_) => "function",
            ScriptValue::Opaque(_) => "opaque",
        }
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        write!(f, "{}", n)
    }
}

/// 字面量形式：字符串带引号，对象按键排序
impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => f.write_str("undefined"),
            ScriptValue::Null => f.write_str("null"),
            ScriptValue::Bool(b) => write!(f, "{}", b),
            ScriptValue::Number(n) => write_number(f, *n),
            ScriptValue::String(s) => write!(f, "{:?}", s),
            ScriptValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            ScriptValue::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, map[key])?;
                }
                f.write_str("}")
            }
            ScriptValue::Function(function) => write!(f, "{}", function),
            ScriptValue::Opaque(description) => f.write_str(description),
        }
    }
}

/// 参数列表的字面量形式，例如 `[1, "a"]`
pub fn format_arguments(args: &[ScriptValue]) -> String {
    ScriptValue::Array(args.to_vec()).to_string()
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ScriptValue {
                fn from(value: $ty) -> Self {
                    ScriptValue::Number(value as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Bool(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::String(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::String(value)
    }
}

impl From<()> for ScriptValue {
    fn from(_: ()) -> Self {
        ScriptValue::Undefined
    }
}

impl From<HostFunction> for ScriptValue {
    fn from(value: HostFunction) -> Self {
        ScriptValue::Function(value)
    }
}

impl<T: Into<ScriptValue>> From<Vec<T>> for ScriptValue {
    fn from(values: Vec<T>) -> Self {
        ScriptValue::Array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ScriptValue>> From<Option<T>> for ScriptValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ScriptValue::Null)
    }
}

impl From<HashMap<String, ScriptValue>> for ScriptValue {
    fn from(map: HashMap<String, ScriptValue>) -> Self {
        ScriptValue::Object(map)
    }
}

// ============================================================================
// 宿主参数与返回值
// ============================================================================

/// 宿主函数的参数类型
///
/// 严格匹配，不做脚本运行时的隐式类型转换。
pub trait FromScriptValue: Sized {
    /// 参数类型在显示标识中的名字
    fn type_name() -> String;

    fn from_script_value(value: &ScriptValue) -> Option<Self>;
}

impl FromScriptValue for f64 {
    fn type_name() -> String {
        "f64".to_string()
    }

    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        value.as_number()
    }
}

impl FromScriptValue for f32 {
    fn type_name() -> String {
        "f32".to_string()
    }

    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        value.as_number().map(|n| n as f32)
    }
}

macro_rules! impl_from_script_integer {
    ($($ty:ty),*) => {
        $(
            impl FromScriptValue for $ty {
                fn type_name() -> String {
                    stringify!($ty).to_string()
                }

                fn from_script_value(value: &ScriptValue) -> Option<Self> {
                    let n = value.as_number()?;
                    // `MAX as f64` 对 64 位类型会向上取整到 2^64 / 2^63，上界按开区间比较
                    if n.fract() != 0.0 || n < <$ty>::MIN as f64 || n >= <$ty>::MAX as f64 + 1.0 {
                        return None;
                    }
                    Some(n as $ty)
                }
            }
        )*
    };
}

impl_from_script_integer!(i32, i64, u8, u32, u64, usize);

impl FromScriptValue for bool {
    fn type_name() -> String {
        "bool".to_string()
    }

    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromScriptValue for String {
    fn type_name() -> String {
        "String".to_string()
    }

    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromScriptValue for ScriptValue {
    fn type_name() -> String {
        "ScriptValue".to_string()
    }

    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromScriptValue for HostFunction {
    fn type_name() -> String {
        "HostFunction".to_string()
    }

    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        value.as_function().cloned()
    }
}

impl<T: FromScriptValue> FromScriptValue for Vec<T> {
    fn type_name() -> String {
        format!("Vec<{}>", T::type_name())
    }

    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        match value {
            ScriptValue::Array(items) => items.iter().map(T::from_script_value).collect(),
            _ => None,
        }
    }
}

impl<T: FromScriptValue> FromScriptValue for Option<T> {
    fn type_name() -> String {
        format!("Option<{}>", T::type_name())
    }

    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        if value.is_nullish() {
            Some(None)
        } else {
            T::from_script_value(value).map(Some)
        }
    }
}

impl FromScriptValue for HashMap<String, ScriptValue> {
    fn type_name() -> String {
        "Object".to_string()
    }

    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        match value {
            ScriptValue::Object(map) => Some(map.clone()),
            _ => None,
        }
    }
}

/// 宿主函数的返回类型
pub trait IntoHostResult {
    /// 声明的返回类型是否为数值
    fn is_numeric() -> bool;

    fn into_host_result(self) -> Result<ScriptValue, BoxError>;
}

macro_rules! impl_into_host_result {
    ($numeric:expr => $($ty:ty),*) => {
        $(
            impl IntoHostResult for $ty {
                fn is_numeric() -> bool {
                    $numeric
                }

                fn into_host_result(self) -> Result<ScriptValue, BoxError> {
                    Ok(ScriptValue::from(self))
                }
            }
        )*
    };
}

impl_into_host_result!(true => f64, f32, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);
impl_into_host_result!(false => bool, String, &'static str, (), ScriptValue, HostFunction, HashMap<String, ScriptValue>);

impl<T: Into<ScriptValue>> IntoHostResult for Vec<T> {
    fn is_numeric() -> bool {
        false
    }

    fn into_host_result(self) -> Result<ScriptValue, BoxError> {
        Ok(ScriptValue::from(self))
    }
}

impl<T: Into<ScriptValue>> IntoHostResult for Option<T> {
    fn is_numeric() -> bool {
        false
    }

    fn into_host_result(self) -> Result<ScriptValue, BoxError> {
        Ok(ScriptValue::from(self))
    }
}

impl<T, E> IntoHostResult for Result<T, E>
where
    T: IntoHostResult,
    E: Into<BoxError>,
{
    fn is_numeric() -> bool {
        T::is_numeric()
    }

    fn into_host_result(self) -> Result<ScriptValue, BoxError> {
        match self {
            Ok(value) => value.into_host_result(),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_literals() {
        let args = vec![
            ScriptValue::from(1),
            ScriptValue::from(2.5),
            ScriptValue::from("a"),
            ScriptValue::Null,
            ScriptValue::Undefined,
        ];
        assert_eq!(format_arguments(&args), r#"[1, 2.5, "a", null, undefined]"#);
        assert_eq!(format_arguments(&[]), "[]");
        assert_eq!(ScriptValue::Number(f64::INFINITY).to_string(), "Infinity");
    }

    #[test]
    fn test_display_object_sorted() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), ScriptValue::from(true));
        map.insert("a".to_string(), ScriptValue::from(vec![1, 2]));
        assert_eq!(ScriptValue::Object(map).to_string(), "{a: [1, 2], b: true}");
    }

    #[test]
    fn test_strict_parameter_matching() {
        assert_eq!(f64::from_script_value(&ScriptValue::from(3)), Some(3.0));
        assert_eq!(f64::from_script_value(&ScriptValue::from("3")), None);
        assert_eq!(i32::from_script_value(&ScriptValue::from(2.5)), None);
        assert_eq!(u8::from_script_value(&ScriptValue::from(300)), None);
        assert_eq!(String::from_script_value(&ScriptValue::from(1)), None);
        assert_eq!(
            Option::<f64>::from_script_value(&ScriptValue::Null),
            Some(None)
        );
        assert_eq!(
            Vec::<i64>::from_script_value(&ScriptValue::from(vec![1, 2, 3])),
            Some(vec![1, 2, 3])
        );
        assert_eq!(Vec::<i64>::type_name(), "Vec<i64>");
    }

    #[test]
    fn test_integer_upper_bounds() {
        let two_pow_64 = ScriptValue::Number(18446744073709551616.0);
        let two_pow_63 = ScriptValue::Number(9223372036854775808.0);
        assert_eq!(u64::from_script_value(&two_pow_64), None);
        assert_eq!(usize::from_script_value(&two_pow_64), None);
        assert_eq!(i64::from_script_value(&two_pow_63), None);
        assert_eq!(u64::from_script_value(&two_pow_63), Some(1u64 << 63));

        assert_eq!(u8::from_script_value(&ScriptValue::from(255)), Some(255));
        assert_eq!(u8::from_script_value(&ScriptValue::from(256)), None);
        assert_eq!(i32::from_script_value(&ScriptValue::from(i32::MAX)), Some(i32::MAX));
        assert_eq!(i32::from_script_value(&ScriptValue::Number(2147483648.0)), None);
        assert_eq!(i64::from_script_value(&ScriptValue::Number(-9223372036854775808.0)), Some(i64::MIN));
    }

    #[test]
    fn test_host_result_kinds() {
        assert!(f64::is_numeric());
        assert!(<Result<i32, std::io::Error>>::is_numeric());
        assert!(!String::is_numeric());
        assert!(!Option::<f64>::is_numeric());

        let failed: Result<f64, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(failed.into_host_result().unwrap_err().to_string(), "boom");
        assert_eq!(().into_host_result().unwrap(), ScriptValue::Undefined);
    }
}
