//! Host Function Bridge
//!
//! Wraps a native Rust function, optionally bound to an instance, so that
//! scripts can call it like an ordinary function. Parameter and return types
//! are resolved once, when the bridge is built; a bridge never changes after
//! construction and holds no reference to the engine that exposes it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::protocol::ScriptObject;
use super::value::{format_arguments, FromScriptValue, IntoHostResult, ScriptValue};
use crate::core::{BoxError, ErrorCause, ScriptError, ScriptResult};

/// 原生调用失败原因
#[derive(Error, Debug)]
pub enum InvocationFailure {
    #[error("expected {expected} argument(s), got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument {index} must be {expected}, got {found}")]
    ArgumentType {
        index: usize,
        expected: String,
        found: &'static str,
    },

    #[error(transparent)]
    Failed(BoxError),
}

impl InvocationFailure {
    fn into_cause(self) -> ErrorCause {
        match self {
            InvocationFailure::Failed(err) => Arc::from(err),
            other => Arc::new(other),
        }
    }
}

type Callable = dyn Fn(&[ScriptValue]) -> Result<ScriptValue, InvocationFailure> + Send + Sync;
type MethodCallable<T> =
    dyn Fn(&T, &[ScriptValue]) -> Result<ScriptValue, InvocationFailure> + Send + Sync;

fn convert_argument<A: FromScriptValue>(
    args: &[ScriptValue],
    index: usize,
) -> Result<A, InvocationFailure> {
    let value = &args[index];
    A::from_script_value(value).ok_or_else(|| InvocationFailure::ArgumentType {
        index,
        expected: A::type_name(),
        found: value.type_name(),
    })
}

/// 可作为静态宿主函数的闭包
pub trait HostFn<Args>: Send + Sync + 'static {
    fn param_types() -> Vec<String>;

    fn returns_number() -> bool;

    fn invoke(&self, args: &[ScriptValue]) -> Result<ScriptValue, InvocationFailure>;
}

/// 可绑定到实例的方法闭包，第一个参数为实例引用
pub trait HostMethod<T, Args>: Send + Sync + 'static {
    fn param_types() -> Vec<String>;

    fn returns_number() -> bool;

    fn invoke(&self, this: &T, args: &[ScriptValue]) -> Result<ScriptValue, InvocationFailure>;
}

macro_rules! impl_host_callables {
    ($($arg:ident $var:ident),*) => {
        impl<F, R, $($arg,)*> HostFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: IntoHostResult,
            $($arg: FromScriptValue,)*
        {
            fn param_types() -> Vec<String> {
                vec![$($arg::type_name()),*]
            }

            fn returns_number() -> bool {
                R::is_numeric()
            }

            #[allow(unused_variables, unused_mut, unused_assignments)]
            fn invoke(&self, args: &[ScriptValue]) -> Result<ScriptValue, InvocationFailure> {
                let expected = $crate::count_idents!($($arg)*);
                if args.len() != expected {
                    return Err(InvocationFailure::Arity { expected, actual: args.len() });
                }
                let mut index = 0;
                $(
                    let $var = convert_argument::<$arg>(args, index)?;
                    index += 1;
                )*
                (self)($($var),*).into_host_result().map_err(InvocationFailure::Failed)
            }
        }

        impl<T, F, R, $($arg,)*> HostMethod<T, ($($arg,)*)> for F
        where
            F: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            R: IntoHostResult,
            $($arg: FromScriptValue,)*
        {
            fn param_types() -> Vec<String> {
                vec![$($arg::type_name()),*]
            }

            fn returns_number() -> bool {
                R::is_numeric()
            }

            #[allow(unused_variables, unused_mut, unused_assignments)]
            fn invoke(&self, this: &T, args: &[ScriptValue]) -> Result<ScriptValue, InvocationFailure> {
                let expected = $crate::count_idents!($($arg)*);
                if args.len() != expected {
                    return Err(InvocationFailure::Arity { expected, actual: args.len() });
                }
                let mut index = 0;
                $(
                    let $var = convert_argument::<$arg>(args, index)?;
                    index += 1;
                )*
                (self)(this, $($var),*).into_host_result().map_err(InvocationFailure::Failed)
            }
        }
    };
}

impl_host_callables!();
impl_host_callables!(A1 a1);
impl_host_callables!(A1 a1, A2 a2);
impl_host_callables!(A1 a1, A2 a2, A3 a3);
impl_host_callables!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_host_callables!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_host_callables!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);

/// 类型的短名称，去掉模块路径和泛型参数
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

struct BridgeInner {
    owner: String,
    name: String,
    param_types: Vec<String>,
    returns_number: bool,
    instance: Option<Arc<dyn Any + Send + Sync>>,
    callable: Arc<Callable>,
}

/// 宿主函数桥
///
/// 克隆共享同一个底层函数；相等性按身份比较。
#[derive(Clone)]
pub struct HostFunction {
    inner: Arc<BridgeInner>,
}

impl HostFunction {
    /// 静态函数
    ///
    /// ```rust
    /// use script_engine::HostFunction;
    ///
    /// let add = HostFunction::from_fn("Math", "add", |a: f64, b: f64| a + b);
    /// assert_eq!(add.to_string(), "Math.add(f64, f64)");
    /// ```
    pub fn from_fn<Args, F>(owner: impl Into<String>, name: impl Into<String>, f: F) -> Self
    where
        F: HostFn<Args>,
    {
        let param_types = F::param_types();
        let returns_number = F::returns_number();
        Self::from_parts(
            owner.into(),
            name.into(),
            param_types,
            returns_number,
            None,
            Arc::new(move |args: &[ScriptValue]| f.invoke(args)),
        )
    }

    /// 绑定到实例的方法，所属类型名取自 `T`
    pub fn bound<T, Args, F>(instance: Arc<T>, name: impl Into<String>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: HostMethod<T, Args>,
    {
        let param_types = F::param_types();
        let returns_number = F::returns_number();
        let method: Arc<MethodCallable<T>> =
            Arc::new(move |this: &T, args: &[ScriptValue]| f.invoke(this, args));
        Self::bind_instance(
            short_type_name::<T>(),
            name.into(),
            param_types,
            returns_number,
            instance,
            method,
        )
    }

    fn bind_instance<T>(
        owner: String,
        name: String,
        param_types: Vec<String>,
        returns_number: bool,
        instance: Arc<T>,
        method: Arc<MethodCallable<T>>,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        let target = Arc::clone(&instance);
        let callable = Arc::new(move |args: &[ScriptValue]| method(&target, args));
        let instance: Arc<dyn Any + Send + Sync> = instance;
        Self::from_parts(owner, name, param_types, returns_number, Some(instance), callable)
    }

    fn from_parts(
        owner: String,
        name: String,
        param_types: Vec<String>,
        returns_number: bool,
        instance: Option<Arc<dyn Any + Send + Sync>>,
        callable: Arc<Callable>,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                owner,
                name,
                param_types,
                returns_number,
                instance,
                callable,
            }),
        }
    }

    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn param_types(&self) -> &[String] {
        &self.inner.param_types
    }

    pub fn returns_number(&self) -> bool {
        self.inner.returns_number
    }

    pub fn is_static(&self) -> bool {
        self.inner.instance.is_none()
    }

    /// 绑定的实例
    pub fn instance(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.inner.instance.as_ref()
    }

    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// 调用原生函数；失败时消息包含显示标识和实际参数列表
    pub fn invoke(&self, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        (self.inner.callable)(args).map_err(|failure| {
            let message = match &failure {
                InvocationFailure::Failed(err) => format!(
                    "Function {} failed with arguments {}: {}",
                    self,
                    format_arguments(args),
                    err
                ),
                mismatch => format!(
                    "Function {} cannot accept arguments {}: {}",
                    self,
                    format_arguments(args),
                    mismatch
                ),
            };
            tracing::debug!(target: "scripting.bridge", "{}", message);
            ScriptError::host_invocation(message, Some(failure.into_cause()))
        })
    }

    fn no_structure(&self, what: &str) -> ScriptError {
        ScriptError::unsupported(format!(
            "{} maps to a native method and {}",
            self, what
        ))
    }
}

impl fmt::Display for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}({})",
            self.inner.owner,
            self.inner.name,
            self.inner.param_types.join(", ")
        )
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({})", self)
    }
}

impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl ScriptObject for HostFunction {
    fn call(&self, _receiver: &ScriptValue, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        // 接收者只是脚本侧的调用作用域，原生函数不是脚本对象成员
        self.invoke(args)
    }

    fn new_object(&self, _args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        Err(self.no_structure("cannot be instantiated"))
    }

    fn get_member(&self, name: &str) -> ScriptResult<ScriptValue> {
        Err(self.no_structure(&format!("has no member `{}`", name)))
    }

    fn set_member(&self, name: &str, _value: ScriptValue) -> ScriptResult<()> {
        Err(self.no_structure(&format!("cannot hold member `{}`", name)))
    }

    fn remove_member(&self, name: &str) -> ScriptResult<()> {
        Err(self.no_structure(&format!("has no member `{}`", name)))
    }

    fn get_slot(&self, index: u32) -> ScriptResult<ScriptValue> {
        Err(self.no_structure(&format!("has no slot {}", index)))
    }

    fn set_slot(&self, index: u32, _value: ScriptValue) -> ScriptResult<()> {
        Err(self.no_structure(&format!("cannot hold slot {}", index)))
    }

    fn has_member(&self, _name: &str) -> bool {
        false
    }

    fn has_slot(&self, _index: u32) -> bool {
        false
    }

    fn member_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn values(&self) -> Vec<ScriptValue> {
        Vec::new()
    }

    fn is_function(&self) -> bool {
        true
    }

    fn is_strict_function(&self) -> bool {
        true
    }

    fn is_array(&self) -> bool {
        false
    }

    fn is_instance_of(&self, _class: &ScriptValue) -> bool {
        false
    }

    fn class_name(&self) -> String {
        self.inner.name.clone()
    }

    fn to_number(&self) -> ScriptResult<f64> {
        if !self.inner.param_types.is_empty() || !self.inner.returns_number {
            return Err(self.no_structure(
                "does not return a number or requires parameters",
            ));
        }
        match self.invoke(&[])? {
            ScriptValue::Number(n) => Ok(n),
            other => Err(ScriptError::host_invocation(
                format!("Function {} returned non-numeric {}", self, other),
                None,
            )),
        }
    }
}

struct MethodEntry<T> {
    name: String,
    param_types: Vec<String>,
    returns_number: bool,
    method: Arc<MethodCallable<T>>,
}

/// 类型的方法表
///
/// 按名称和参数类型列表解析方法，解析失败发生在构造桥的时刻，而不是调用时。
///
/// ```rust
/// use std::sync::Arc;
/// use script_engine::MethodTable;
///
/// struct Greeter {
///     greeting: String,
/// }
///
/// let table = MethodTable::<Greeter>::new()
///     .method("greet", |g: &Greeter, name: String| format!("{} {}", g.greeting, name));
///
/// let greeter = Arc::new(Greeter { greeting: "hello".into() });
/// let greet = table.resolve(greeter, "greet", &["String"]).unwrap();
/// assert_eq!(greet.to_string(), "Greeter.greet(String)");
/// ```
pub struct MethodTable<T> {
    owner: String,
    methods: Vec<MethodEntry<T>>,
}

impl<T: Send + Sync + 'static> MethodTable<T> {
    pub fn new() -> Self {
        Self::named(short_type_name::<T>())
    }

    /// 指定显示用的所属类型名
    pub fn named(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            methods: Vec::new(),
        }
    }

    /// 注册方法；同名同参数列表的方法会被替换
    pub fn method<Args, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: HostMethod<T, Args>,
    {
        let name = name.into();
        let param_types = F::param_types();
        let returns_number = F::returns_number();
        self.methods
            .retain(|m| !(m.name == name && m.param_types == param_types));
        self.methods.push(MethodEntry {
            name,
            param_types,
            returns_number,
            method: Arc::new(move |this: &T, args: &[ScriptValue]| f.invoke(this, args)),
        });
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 已注册方法的签名，例如 `add(f64, f64)`
    pub fn signatures(&self) -> Vec<String> {
        self.methods
            .iter()
            .map(|m| format!("{}({})", m.name, m.param_types.join(", ")))
            .collect()
    }

    /// 解析方法并绑定到实例
    pub fn resolve(
        &self,
        instance: Arc<T>,
        name: &str,
        param_types: &[&str],
    ) -> ScriptResult<HostFunction> {
        let entry = self
            .methods
            .iter()
            .find(|m| {
                m.name == name
                    && m.param_types.iter().map(String::as_str).eq(param_types.iter().copied())
            })
            .ok_or_else(|| {
                ScriptError::no_such_path(
                    format!("{}.{}({})", self.owner, name, param_types.join(", ")),
                    "no such method",
                )
            })?;

        Ok(HostFunction::bind_instance(
            self.owner.clone(),
            entry.name.clone(),
            entry.param_types.clone(),
            entry.returns_number,
            instance,
            Arc::clone(&entry.method),
        ))
    }
}

impl<T: Send + Sync + 'static> Default for MethodTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use std::error::Error as _;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Calculator {
        offset: f64,
        calls: AtomicU32,
    }

    fn calculator() -> Arc<Calculator> {
        Arc::new(Calculator {
            offset: 1.0,
            calls: AtomicU32::new(0),
        })
    }

    fn add_bridge() -> HostFunction {
        HostFunction::bound(calculator(), "add", |c: &Calculator, a: f64, b: f64| {
            c.calls.fetch_add(1, Ordering::SeqCst);
            a + b + c.offset
        })
    }

    #[test]
    fn test_display_identity() {
        assert_eq!(add_bridge().to_string(), "Calculator.add(f64, f64)");

        let now = HostFunction::from_fn("Clock", "now", || 0.0);
        assert_eq!(now.to_string(), "Clock.now()");
        assert!(now.is_static());
        assert!(!add_bridge().is_static());
    }

    #[test]
    fn test_call_ignores_receiver() {
        let add = add_bridge();
        let result = add
            .call(&ScriptValue::from("anything"), &[ScriptValue::from(1), ScriptValue::from(2)])
            .unwrap();
        assert_eq!(result, ScriptValue::Number(4.0));
    }

    #[test]
    fn test_arity_mismatch_message() {
        let err = add_bridge().call(&ScriptValue::Undefined, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HostInvocation);
        let message = err.to_string();
        assert!(message.contains("Calculator.add(f64, f64)"));
        assert!(message.contains("[]"));
        assert_eq!(err.line(), None);
    }

    #[test]
    fn test_argument_type_mismatch() {
        let err = add_bridge()
            .invoke(&[ScriptValue::from("x"), ScriptValue::from(1)])
            .unwrap_err();
        assert!(err.to_string().contains(r#"["x", 1]"#));
        assert!(err.source().unwrap().to_string().contains("argument 0 must be f64"));
    }

    #[test]
    fn test_native_failure_keeps_cause() {
        let read = HostFunction::from_fn("Store", "read", |key: String| -> Result<String, std::io::Error> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, format!("missing {key}")))
        });
        let err = read.invoke(&[ScriptValue::from("k")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HostInvocation);
        assert_eq!(err.source().unwrap().to_string(), "missing k");
    }

    #[test]
    fn test_structural_operations_unsupported() {
        let add = add_bridge();
        let kinds = [
            add.new_object(&[]).unwrap_err().kind(),
            add.get_member("x").unwrap_err().kind(),
            add.set_member("x", ScriptValue::Null).unwrap_err().kind(),
            add.remove_member("x").unwrap_err().kind(),
            add.get_slot(0).unwrap_err().kind(),
            add.set_slot(0, ScriptValue::Null).unwrap_err().kind(),
        ];
        assert!(kinds.iter().all(|k| *k == ErrorKind::UnsupportedOperation));
    }

    #[test]
    fn test_membership_and_identity_queries() {
        let add = add_bridge();
        assert!(!add.has_member("length"));
        assert!(!add.has_slot(0));
        assert!(add.member_names().is_empty());
        assert!(add.values().is_empty());
        assert!(add.is_function());
        assert!(add.is_strict_function());
        assert!(!add.is_array());
        assert!(!add.is_instance_of(&ScriptValue::Null));
        assert_eq!(add.class_name(), "add");
    }

    #[test]
    fn test_numeric_coercion() {
        let answer = HostFunction::from_fn("Oracle", "answer", || 42_i32);
        assert_eq!(answer.to_number().unwrap(), 42.0);

        let err = add_bridge().to_number().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);

        let name = HostFunction::from_fn("Oracle", "name", || "deep thought");
        assert_eq!(name.to_number().unwrap_err().kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_identity_equality() {
        let add = add_bridge();
        assert_eq!(add, add.clone());
        assert_ne!(add, add_bridge());
    }

    #[test]
    fn test_method_table_resolution() {
        let table = MethodTable::<Calculator>::new()
            .method("add", |c: &Calculator, a: f64, b: f64| a + b + c.offset)
            .method("add", |c: &Calculator, a: f64| a + c.offset)
            .method("describe", |_: &Calculator| "calc");

        assert_eq!(table.owner(), "Calculator");
        assert_eq!(table.signatures().len(), 3);

        let add_one = table.resolve(calculator(), "add", &["f64"]).unwrap();
        assert_eq!(add_one.to_string(), "Calculator.add(f64)");
        assert_eq!(add_one.invoke(&[ScriptValue::from(2)]).unwrap(), ScriptValue::Number(3.0));

        let err = table.resolve(calculator(), "add", &["String"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchPath);
        assert!(err.to_string().contains("Calculator.add(String)"));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Calculator>(), "Calculator");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }
}
