use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{Error, Tool, ToolResult};

pub(crate) type BoxedToolFuture =
    Pin<Box<dyn Future<Output = ToolResult> + Send>>;

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    fn execute(
        self: Arc<Self>,
        arguments: Value,
        cancel: CancellationToken,
    ) -> BoxedToolFuture;
}

pub(crate) struct ToolObjectImpl<T: Tool>(pub T);

impl<T: Tool> ToolObject for ToolObjectImpl<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    fn execute(
        self: Arc<Self>,
        arguments: Value,
        cancel: CancellationToken,
    ) -> BoxedToolFuture {
        // Models tend to omit the arguments entirely for parameterless tools.
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            arguments => arguments,
        };
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(std::future::ready(ToolResult::Err(
                    Error::invalid_input().with_reason(reason),
                )));
            }
        };

        let span = debug_span!("tool execute", name = self.0.name());
        let fut = self.0.execute(input, cancel.clone());
        Box::pin(
            async move {
                select! {
                    biased;

                    _ = cancel.cancelled() => {
                        trace!("cancelled");
                        Err(Error::cancelled())
                    }
                    result = fut => result,
                }
            }
            .instrument(span),
        )
    }
}
