//! Built-in event handlers.
//!
//! | Event       | Args           | Reply                     |
//! |-------------|----------------|---------------------------|
//! | `ping`      | none           | `"pong"`                  |
//! | `echo`      | any            | the args, as an array     |
//! | `state.get` | key            | stored value (or `""`)    |
//! | `state.set` | key, value     | `true`                    |

use anyhow::Context;
use serde_json::Value;

use crate::dispatch::{handler_fn, Layer};

/// The built-in handler layer. Usually added first so applications can
/// override any of its events.
pub fn builtin_layer() -> Layer {
    Layer::new()
        .on("ping", handler_fn(|_, _, _| Ok(Value::from("pong"))))
        .on("echo", handler_fn(|_, _, args| Ok(Value::Array(args))))
        .on(
            "state.get",
            handler_fn(|_, state, args| {
                let key = string_arg(&args, 0, "key")?;
                Ok(Value::from(state.get(key)))
            }),
        )
        .on(
            "state.set",
            handler_fn(|_, state, args| {
                let key = string_arg(&args, 0, "key")?;
                let value = string_arg(&args, 1, "value")?;
                state.set(key, value);
                Ok(Value::Bool(true))
            }),
        )
}

fn string_arg<'a>(args: &'a [Value], index: usize, name: &str) -> anyhow::Result<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .with_context(|| format!("argument {index} ({name}) must be a string"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ConnectionHandle, HandlerRegistry};
    use crate::state::ConnectionState;
    use serde_json::json;

    async fn call(name: &str, state: &mut ConnectionState, args: Vec<Value>) -> anyhow::Result<Value> {
        let mut builder = HandlerRegistry::builder();
        builder.add(builtin_layer());
        let registry = builder.build();
        let (conn, _out) = ConnectionHandle::channel(1);
        registry.resolve(name)?.call(&conn, state, args).await
    }

    #[tokio::test]
    async fn ping_and_echo() {
        let mut state = ConnectionState::default();
        assert_eq!(call("ping", &mut state, vec![]).await.unwrap(), json!("pong"));
        assert_eq!(
            call("echo", &mut state, vec![json!(1), json!("a")]).await.unwrap(),
            json!([1, "a"])
        );
    }

    #[tokio::test]
    async fn state_round_trip() {
        let mut state = ConnectionState::default();
        assert_eq!(call("state.get", &mut state, vec![json!("k")]).await.unwrap(), json!(""));
        call("state.set", &mut state, vec![json!("k"), json!("v")]).await.unwrap();
        assert_eq!(call("state.get", &mut state, vec![json!("k")]).await.unwrap(), json!("v"));
    }

    #[tokio::test]
    async fn non_string_arguments_fail() {
        let mut state = ConnectionState::default();
        let err = call("state.set", &mut state, vec![json!("k"), json!(3)]).await.unwrap_err();
        assert_eq!(err.to_string(), "argument 1 (value) must be a string");
    }
}
