//! Construction macros for `Value` literals.

/// Builds a `Value::List` from expressions convertible into `Value`.
///
/// ```
/// use livepack::{list, Value};
/// let v = list![1, 1.5, "Hello world"];
/// assert_eq!(v.index(2).and_then(Value::as_str), Some("Hello world"));
/// ```
#[macro_export]
macro_rules! list {
    () => { $crate::Value::List(::std::vec::Vec::new()) };
    ($($item:expr),+ $(,)?) => {
        $crate::Value::List(::std::vec![$($crate::Value::from($item)),+])
    };
}

/// Builds a `Value::Map` from `key => value` pairs.
///
/// ```
/// use livepack::{map, Value};
/// let v = map! { "hello world" => "object value" };
/// assert_eq!(v.get("hello world").and_then(Value::as_str), Some("object value"));
/// ```
#[macro_export]
macro_rules! map {
    () => { $crate::Value::Map(::std::collections::BTreeMap::new()) };
    ($($key:expr => $val:expr),+ $(,)?) => {{
        let mut entries = ::std::collections::BTreeMap::new();
        $( entries.insert(::std::string::String::from($key), $crate::Value::from($val)); )+
        $crate::Value::Map(entries)
    }};
}
