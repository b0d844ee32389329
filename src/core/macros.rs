//! 核心宏定义

/// 为配置结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use script_engine::impl_default;
///
/// struct Limits {
///     stack: usize,
///     label: String,
/// }
///
/// impl_default!(Limits {
///     stack: 256 * 1024,
///     label: String::new(),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

/// 统计宏参数个数
#[doc(hidden)]
#[macro_export]
macro_rules! count_idents {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + $crate::count_idents!($($tail)*) };
}
