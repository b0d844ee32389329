//! QuickJS adapter for host function bridges
//!
//! A bridge is installed as a `Proxy` around an empty function. Every trap
//! forwards to a small table of Rust callbacks (`ops`), which in turn call the
//! [`ScriptObject`] protocol on the bridge. Failures inside a callback leave
//! through the scope's trampoline.

use std::sync::{Arc, Mutex};

use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};

use crate::core::{ScriptError, ScriptResult};

use super::bridge::HostFunction;
use super::convert::{from_js, receiver_value, to_js};
use super::protocol::ScriptObject;
use super::scope::{lock, Failure, ScopeState};
use super::trampoline::call_site;
use super::value::ScriptValue;

/// Property that identifies an installed bridge; answered by the proxy itself.
pub(crate) const BRIDGE_TAG: &str = "__hostBridge__";

const BRIDGE_FACTORY: &str = r#"
// 绑定函数可调用、可构造，且没有不可配置的 `prototype` 自有属性
const target = (function () {}).bind(null);
return new Proxy(target, {
    apply(_, receiver, args) {
        return ops.call(receiver, ...args);
    },
    construct(_, args) {
        return ops.construct(...args);
    },
    get(_, key) {
        if (key === tag) return ops.id;
        if (key === Symbol.toPrimitive) {
            return (hint) => hint === "number" ? ops.toNumber() : ops.display();
        }
        if (typeof key === "symbol") return undefined;
        return ops.get(key);
    },
    set(_, key, value) {
        if (typeof key === "symbol") return false;
        ops.set(key, value);
        return true;
    },
    has(_, key) {
        if (key === tag) return true;
        if (typeof key === "symbol") return false;
        return ops.has(key);
    },
    deleteProperty(_, key) {
        if (typeof key === "symbol") return false;
        ops.remove(key);
        return true;
    },
    getPrototypeOf() {
        return null;
    },
});
"#;

/// 作用域内已安装的宿主函数；编号即下标
#[derive(Debug, Default)]
pub(crate) struct BridgeRegistry {
    bridges: Mutex<Vec<HostFunction>>,
}

impl BridgeRegistry {
    /// 同一个桥重复安装时复用编号
    pub(crate) fn register(&self, function: &HostFunction) -> u32 {
        let mut bridges = lock(&self.bridges);
        if let Some(id) = bridges.iter().position(|b| b.ptr_eq(function)) {
            return id as u32;
        }
        bridges.push(function.clone());
        (bridges.len() - 1) as u32
    }

    pub(crate) fn lookup(&self, id: u32) -> Option<HostFunction> {
        lock(&self.bridges).get(id as usize).cloned()
    }
}

/// Numeric member names address slots.
enum Key {
    Member(String),
    Slot(u32),
}

impl Key {
    fn parse(key: String) -> Self {
        match key.parse::<u32>() {
            Ok(index) if index.to_string() == key => Key::Slot(index),
            _ => Key::Member(key),
        }
    }
}

/// Hand a callback result back to QuickJS; typed errors go through the trampoline.
fn settle<'js>(
    ctx: &Ctx<'js>,
    state: &Arc<ScopeState>,
    result: ScriptResult<ScriptValue>,
) -> rquickjs::Result<Value<'js>> {
    let failure = match result {
        Ok(value) => match to_js(ctx, state, &value) {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        },
        Err(err) if err.line().is_none() => Failure::Script(err.at_position(call_site(ctx))),
        Err(err) => Failure::Script(err),
    };

    match failure {
        Failure::Js(err) => Err(err),
        Failure::Script(err) => Err(state.trampoline.throw(ctx, err)),
    }
}

fn convert_args(state: &ScopeState, args: &[Value<'_>]) -> rquickjs::Result<Vec<ScriptValue>> {
    args.iter().map(|arg| from_js(state, arg)).collect()
}

/// 将宿主函数安装为脚本可调用的值
pub(crate) fn install<'js>(
    ctx: &Ctx<'js>,
    state: &Arc<ScopeState>,
    function: &HostFunction,
) -> rquickjs::Result<Value<'js>> {
    let ops = Object::new(ctx.clone())?;
    ops.set("id", state.registry.register(function))?;

    let (st, f) = (Arc::clone(state), function.clone());
    ops.set(
        "call",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  receiver: Value<'js>,
                  args: Rest<Value<'js>>|
                  -> rquickjs::Result<Value<'js>> {
                let receiver = receiver_value(&st, &receiver)?;
                let args = convert_args(&st, &args.0)?;
                settle(&ctx, &st, f.call(&receiver, &args))
            },
        )?,
    )?;

    let (st, f) = (Arc::clone(state), function.clone());
    ops.set(
        "construct",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let args = convert_args(&st, &args.0)?;
                settle(&ctx, &st, f.new_object(&args))
            },
        )?,
    )?;

    let (st, f) = (Arc::clone(state), function.clone());
    ops.set(
        "get",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, key: String| {
            let result = match Key::parse(key) {
                Key::Member(name) => f.get_member(&name),
                Key::Slot(index) => f.get_slot(index),
            };
            settle(&ctx, &st, result)
        })?,
    )?;

    let (st, f) = (Arc::clone(state), function.clone());
    ops.set(
        "set",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  key: String,
                  value: Value<'js>|
                  -> rquickjs::Result<Value<'js>> {
                let value = from_js(&st, &value)?;
                let result = match Key::parse(key) {
                    Key::Member(name) => f.set_member(&name, value),
                    Key::Slot(index) => f.set_slot(index, value),
                };
                settle(&ctx, &st, result.map(|_| ScriptValue::Undefined))
            },
        )?,
    )?;

    let f = function.clone();
    ops.set(
        "has",
        Function::new(ctx.clone(), move |key: String| match Key::parse(key) {
            Key::Member(name) => f.has_member(&name),
            Key::Slot(index) => f.has_slot(index),
        })?,
    )?;

    let (st, f) = (Arc::clone(state), function.clone());
    ops.set(
        "remove",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, key: String| {
            let result = match Key::parse(key) {
                Key::Member(name) => f.remove_member(&name),
                Key::Slot(index) => Err(ScriptError::unsupported(format!(
                    "{} cannot remove slot {}",
                    f, index
                ))),
            };
            settle(&ctx, &st, result.map(|_| ScriptValue::Undefined))
        })?,
    )?;

    let (st, f) = (Arc::clone(state), function.clone());
    ops.set(
        "toNumber",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>| {
            settle(&ctx, &st, f.to_number().map(ScriptValue::Number))
        })?,
    )?;

    let f = function.clone();
    ops.set(
        "display",
        Function::new(ctx.clone(), move || f.to_string())?,
    )?;

    let function_ctor: Function = ctx.globals().get("Function")?;
    let factory: Function = function_ctor.call(("ops", "tag", BRIDGE_FACTORY))?;
    factory.call((ops, BRIDGE_TAG))
}

/// 读取函数值上的桥编号，找回原始宿主函数
pub(crate) fn installed_bridge(
    state: &ScopeState,
    value: &Value<'_>,
) -> rquickjs::Result<Option<HostFunction>> {
    let Some(object) = value.as_object().filter(|_| value.as_function().is_some()) else {
        return Ok(None);
    };
    let id: Option<u32> = object.get(BRIDGE_TAG)?;
    Ok(id.and_then(|id| state.registry.lookup(id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_reuses_ids() {
        let registry = BridgeRegistry::default();
        let a = HostFunction::from_fn("Math", "half", |x: f64| x / 2.0);
        let b = HostFunction::from_fn("Math", "half", |x: f64| x / 2.0);

        assert_eq!(registry.register(&a), 0);
        assert_eq!(registry.register(&b), 1);
        assert_eq!(registry.register(&a.clone()), 0);
        assert_eq!(registry.lookup(1), Some(b));
        assert_eq!(registry.lookup(2), None);
    }

    #[test]
    fn test_numeric_keys_address_slots() {
        assert!(matches!(Key::parse("3".to_string()), Key::Slot(3)));
        assert!(matches!(Key::parse("03".to_string()), Key::Member(_)));
        assert!(matches!(Key::parse("length".to_string()), Key::Member(_)));
    }
}
