//! 宿主值与 QuickJS 值之间的转换
//!
//! 数组和普通对象按值复制；宿主函数桥保持身份，读回时得到同一个桥。
//! 复制时按对象身份去重：共享的子对象只遍历一次，环引用变为 `Opaque("[circular]")`。

use std::collections::HashMap;
use std::sync::Arc;

use rquickjs::{Array, Ctx, Function, Object, Value};

use crate::core::ScriptError;

use super::proxy::{install, installed_bridge};
use super::scope::{Failure, ScopeState};
use super::trampoline::describe;
use super::value::ScriptValue;

/// 复制嵌套结构的最大深度
const MAX_DEPTH: usize = 32;

/// 单次复制产生的值节点上限
const MAX_NODES: usize = 100_000;

/// 作用域内隐藏的内省帮助对象（不可枚举，不算作绑定）
const INTROSPECT_KEY: &str = "__hostIntrospect__";

/// 创建作用域时捕获内置的 `Map`、`Reflect.apply` 和 `Object.prototype.toString`，
/// 脚本之后覆盖这些全局名称不影响转换。
const INTROSPECT_SOURCE: &str = r#"
Object.defineProperty(globalThis, "__hostIntrospect__", {
    value: (() => {
        const apply = Reflect.apply;
        const toString = Object.prototype.toString;
        const M = Map;
        const get = Map.prototype.get;
        const set = Map.prototype.set;
        return Object.freeze({
            tag: (v) => apply(toString, v, []),
            tracker: () => {
                const seen = new M();
                return {
                    id: (o) => apply(get, seen, [o]),
                    mark: (o, i) => { apply(set, seen, [o, i]); },
                };
            },
        });
    })(),
    enumerable: false,
    writable: false,
    configurable: false,
});
"#;

pub(crate) fn install_introspection(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    ctx.eval::<Value, _>(INTROSPECT_SOURCE)?;
    Ok(())
}

/// 宿主值 -> 脚本值
pub(crate) fn to_js<'js>(
    ctx: &Ctx<'js>,
    state: &Arc<ScopeState>,
    value: &ScriptValue,
) -> Result<Value<'js>, Failure> {
    let value = match value {
        ScriptValue::Undefined => Value::new_undefined(ctx.clone()),
        ScriptValue::Null => Value::new_null(ctx.clone()),
        ScriptValue::Bool(b) => Value::new_bool(ctx.clone(), *b),
        ScriptValue::Number(n) => Value::new_number(ctx.clone(), *n),
        ScriptValue::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        ScriptValue::Array(items) => {
            let array = Array::new(ctx.clone())?;
            for (index, item) in items.iter().enumerate() {
                array.set(index, to_js(ctx, state, item)?)?;
            }
            array.into_value()
        }
        ScriptValue::Object(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), to_js(ctx, state, item)?)?;
            }
            object.into_value()
        }
        ScriptValue::Function(function) => install(ctx, state, function)?,
        ScriptValue::Opaque(description) => {
            return Err(ScriptError::unsupported(format!(
                "{} cannot be passed back into a script",
                description
            ))
            .into())
        }
    };
    Ok(value)
}

/// 脚本值 -> 宿主值
pub(crate) fn from_js(state: &ScopeState, value: &Value<'_>) -> rquickjs::Result<ScriptValue> {
    Copier::new(state, value.ctx().clone()).copy(value, 0)
}

/// 调用接收者只做浅转换，避免复制全局对象之类的大对象
pub(crate) fn receiver_value(state: &ScopeState, value: &Value<'_>) -> rquickjs::Result<ScriptValue> {
    if value.as_object().is_none() {
        return from_js(state, value);
    }
    Ok(match installed_bridge(state, value)? {
        Some(function) => ScriptValue::Function(function),
        None => ScriptValue::Opaque("[object]".to_string()),
    })
}

#[derive(Clone)]
struct Tracker<'js> {
    tag: Function<'js>,
    id: Function<'js>,
    mark: Function<'js>,
}

impl<'js> Tracker<'js> {
    fn new(ctx: &Ctx<'js>) -> rquickjs::Result<Self> {
        let helpers: Object = ctx.globals().get(INTROSPECT_KEY)?;
        let create: Function = helpers.get("tracker")?;
        let seen: Object = create.call(())?;
        Ok(Self {
            tag: helpers.get("tag")?,
            id: seen.get("id")?,
            mark: seen.get("mark")?,
        })
    }
}

fn node_count(value: &ScriptValue) -> usize {
    match value {
        ScriptValue::Array(items) => 1 + items.iter().map(node_count).sum::<usize>(),
        ScriptValue::Object(map) => 1 + map.values().map(node_count).sum::<usize>(),
        _ => 1,
    }
}

/// 一次 `from_js` 的复制状态
struct Copier<'a, 'js> {
    state: &'a ScopeState,
    ctx: Ctx<'js>,
    tracker: Option<Tracker<'js>>,
    /// 按身份编号的已复制对象；`None` 表示仍在复制中
    copies: Vec<Option<ScriptValue>>,
    nodes: usize,
}

impl<'a, 'js> Copier<'a, 'js> {
    fn new(state: &'a ScopeState, ctx: Ctx<'js>) -> Self {
        Self {
            state,
            ctx,
            tracker: None,
            copies: Vec::new(),
            nodes: 0,
        }
    }

    fn tracker(&mut self) -> rquickjs::Result<Tracker<'js>> {
        if let Some(tracker) = &self.tracker {
            return Ok(tracker.clone());
        }
        let tracker = Tracker::new(&self.ctx)?;
        self.tracker = Some(tracker.clone());
        Ok(tracker)
    }

    /// 记账；超过上限返回 `false`
    fn spend(&mut self, nodes: usize) -> bool {
        self.nodes += nodes;
        self.nodes <= MAX_NODES
    }

    fn copy(&mut self, value: &Value<'js>, depth: usize) -> rquickjs::Result<ScriptValue> {
        if !self.spend(1) {
            return Ok(ScriptValue::Opaque("[too large]".to_string()));
        }
        if value.is_undefined() {
            return Ok(ScriptValue::Undefined);
        }
        if value.is_null() {
            return Ok(ScriptValue::Null);
        }
        if let Some(b) = value.as_bool() {
            return Ok(ScriptValue::Bool(b));
        }
        if let Some(n) = value.as_number() {
            return Ok(ScriptValue::Number(n));
        }
        if let Some(s) = value.as_string() {
            return Ok(ScriptValue::String(s.to_string()?));
        }
        if value.as_function().is_some() {
            return Ok(match installed_bridge(self.state, value)? {
                Some(function) => ScriptValue::Function(function),
                None => ScriptValue::Opaque("[function]".to_string()),
            });
        }
        if value.is_symbol() {
            return Ok(ScriptValue::Opaque("[symbol]".to_string()));
        }
        if value.as_object().is_some() {
            return self.copy_object(value, depth);
        }
        Ok(ScriptValue::Opaque("[unknown]".to_string()))
    }

    fn copy_object(&mut self, value: &Value<'js>, depth: usize) -> rquickjs::Result<ScriptValue> {
        let tracker = self.tracker()?;

        let tag: String = tracker.tag.call((value.clone(),))?;
        match tag.as_str() {
            "[object Error]" => return Ok(ScriptValue::Opaque(describe(&self.ctx, value))),
            "[object Promise]" => return Ok(ScriptValue::Opaque("[object Promise]".to_string())),
            _ => {}
        }

        let seen: Option<u32> = tracker.id.call((value.clone(),))?;
        if let Some(id) = seen {
            let copy = match self.copies.get(id as usize) {
                Some(Some(copy)) => copy.clone(),
                _ => return Ok(ScriptValue::Opaque("[circular]".to_string())),
            };
            if !self.spend(node_count(&copy)) {
                return Ok(ScriptValue::Opaque("[too large]".to_string()));
            }
            return Ok(copy);
        }

        if depth >= MAX_DEPTH {
            return Ok(ScriptValue::Opaque("[nested too deeply]".to_string()));
        }

        let id = self.copies.len();
        self.copies.push(None);
        tracker.mark.call::<_, ()>((value.clone(), id as u32))?;

        let copy = if let Some(array) = value.as_array() {
            let mut items = Vec::with_capacity(array.len());
            for item in array.iter::<Value>() {
                items.push(self.copy(&item?, depth + 1)?);
            }
            ScriptValue::Array(items)
        } else if let Some(object) = value.as_object() {
            let mut map = HashMap::new();
            for prop in object.props::<String, Value>() {
                let (key, item) = prop?;
                let item = self.copy(&item, depth + 1)?;
                map.insert(key, item);
            }
            ScriptValue::Object(map)
        } else {
            ScriptValue::Opaque("[unknown]".to_string())
        };

        self.copies[id] = Some(copy.clone());
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::interrupt::InterruptState;
    use crate::scripting::scope::Scope;
    use rquickjs::Runtime;

    fn scope() -> Scope {
        let runtime = Runtime::new().unwrap();
        Scope::new(&runtime, Arc::new(InterruptState::default()), None).unwrap()
    }

    fn object(entries: &[(&str, ScriptValue)]) -> ScriptValue {
        ScriptValue::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_self_reference_is_circular() {
        let scope = scope();
        let value = scope
            .evaluate("var a = {}; a.x = a; a.y = a; a.z = 1; a")
            .unwrap();
        let circular = ScriptValue::Opaque("[circular]".to_string());
        assert_eq!(
            value,
            object(&[
                ("x", circular.clone()),
                ("y", circular),
                ("z", ScriptValue::Number(1.0))
            ])
        );
    }

    #[test]
    fn test_shared_reference_copied_by_value() {
        let scope = scope();
        let value = scope.evaluate("var p = { n: 1 }; [p, p]").unwrap();
        let p = object(&[("n", ScriptValue::Number(1.0))]);
        assert_eq!(value, ScriptValue::Array(vec![p.clone(), p]));
    }

    #[test]
    fn test_shared_diamond_chain_finishes() {
        let scope = scope();
        let source = "var node = { leaf: true };\n\
                      for (var i = 0; i < 40; i++) { node = { l: node, r: node }; }\n\
                      node";
        // 共享层级按值复制，超出深度和节点上限的部分变为 Opaque
        let value = scope.evaluate(source).unwrap();
        assert!(matches!(value, ScriptValue::Object(_)));
    }

    #[test]
    fn test_errors_and_promises_are_opaque() {
        let scope = scope();
        assert_eq!(
            scope.evaluate("new Error('boom')").unwrap(),
            ScriptValue::Opaque("Error: boom".to_string())
        );
        assert_eq!(
            scope.evaluate("new TypeError('bad')").unwrap(),
            ScriptValue::Opaque("TypeError: bad".to_string())
        );
        assert_eq!(
            scope.evaluate("Promise.resolve(1)").unwrap(),
            ScriptValue::Opaque("[object Promise]".to_string())
        );
        assert_eq!(
            scope.evaluate("[new Error('inner')]").unwrap(),
            ScriptValue::Array(vec![ScriptValue::Opaque("Error: inner".to_string())])
        );
    }

    #[test]
    fn test_shadowed_globals_do_not_break_copies() {
        let scope = scope();
        let value = scope
            .evaluate("globalThis.Map = null; globalThis.Reflect = null; ({ a: [1] })")
            .unwrap();
        assert_eq!(
            value,
            object(&[("a", ScriptValue::Array(vec![ScriptValue::Number(1.0)]))])
        );
    }

    #[test]
    fn test_introspection_is_not_a_binding() {
        let scope = scope();
        assert_eq!(
            scope.evaluate("Object.keys(globalThis).length").unwrap(),
            ScriptValue::Number(0.0)
        );
    }
}
