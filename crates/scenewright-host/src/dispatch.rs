//! Method routing.
//!
//! Every wire method maps to one handler in [`METHODS`]. `batch` is handled
//! by the dispatcher itself so it can re-enter the table.

use crate::host::EditorHost;
use crate::params::Params;
use crate::scene::SignalConnection;
use scenewright_core::{Capabilities, PROTOCOL_VERSION, ProjectPath, RemoteError};
use serde_json::{Value, json};

type Handler = fn(&mut EditorHost, Params<'_>) -> Result<Value, RemoteError>;

pub const BATCH_METHOD: &str = "batch";

const METHODS: &[(&str, Handler)] = &[
    ("ping", |_, _| Ok(json!({ "pong": true }))),
    ("get_capabilities", |_, _| Ok(json!(capabilities()))),
    ("create_scene", |host, p| {
        host.create_scene(
            p.path("path")?,
            p.opt_str("root_class")?.unwrap_or("Node"),
            p.opt_str("root_name")?,
            p.bool_or("overwrite", false)?,
        )
    }),
    ("open_scene", |host, p| host.open_scene(p.path("path")?)),
    ("save_scene", |host, p| host.save_scene(p.opt_path("scene")?)),
    ("close_scene", |host, p| host.close_scene(p.opt_path("scene")?)),
    ("add_node", |host, p| {
        host.add_node(
            p.opt_path("scene")?,
            p.opt_str("parent")?.unwrap_or("."),
            p.str("name")?,
            p.str("class")?,
            p.properties()?,
        )
    }),
    ("remove_node", |host, p| {
        host.remove_node(p.opt_path("scene")?, p.str("path")?)
    }),
    ("instance_scene", |host, p| {
        host.instance_scene(
            p.opt_path("scene")?,
            p.opt_str("parent")?.unwrap_or("."),
            p.path("source")?,
            p.opt_str("name")?,
        )
    }),
    ("set_property", |host, p| {
        host.set_property(
            p.opt_path("scene")?,
            p.str("node")?,
            p.str("property")?,
            p.variant("value")?,
        )
    }),
    ("get_property", |host, p| {
        host.get_property(p.opt_path("scene")?, p.str("node")?, p.str("property")?)
    }),
    ("connect_signal", |host, p| {
        host.connect_signal(
            p.opt_path("scene")?,
            p.str("node")?,
            SignalConnection {
                signal: p.str("signal")?.to_string(),
                target: p.str("target")?.to_string(),
                method: p.str("method")?.to_string(),
            },
        )
    }),
    ("attach_script", |host, p| {
        host.attach_script(p.opt_path("scene")?, p.str("node")?, p.path("script")?)
    }),
    ("write_text_file", |host, p| {
        host.write_text_file(
            p.path("path")?,
            p.str("content")?,
            p.bool_or("overwrite", false)?,
        )
    }),
    ("read_text_file", |host, p| host.read_text_file(p.path("path")?)),
    ("filesystem_scan", |host, _| host.filesystem_scan()),
    ("reimport", |host, p| {
        let paths = match p.value("paths")? {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| RemoteError::invalid_param("paths", "expected strings"))?
                        .parse::<ProjectPath>()
                        .map_err(|e| RemoteError::invalid_param("paths", e))
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(RemoteError::invalid_param("paths", "expected an array")),
        };
        host.reimport(paths)
    }),
    ("validate_scene", |host, p| host.validate_scene(p.path("path")?)),
    ("begin_action", |host, p| host.begin_action(p.str("name")?)),
    ("commit_action", |host, _| host.commit_action()),
    ("undo", |host, _| host.undo()),
    ("call", |host, p| {
        host.call(&p.target()?, p.str("method")?, &p.args()?)
    }),
    ("get", |host, p| host.get(&p.target()?, p.str("property")?)),
    ("set", |host, p| {
        host.set(&p.target()?, p.str("property")?, p.variant("value")?)
    }),
    ("inspect_object", |host, p| host.inspect_object(&p.target()?)),
    ("inspect_class", |host, p| host.inspect_class(p.str("class")?)),
    ("list_singletons", |host, _| Ok(json!(host.singleton_names()))),
];

/// Advertised capabilities: every routable method, `batch` included.
pub fn capabilities() -> Capabilities {
    let mut methods: Vec<String> = METHODS.iter().map(|(name, _)| name.to_string()).collect();
    methods.push(BATCH_METHOD.to_string());
    methods.sort();
    Capabilities {
        protocol: PROTOCOL_VERSION.to_string(),
        plugin_version: env!("CARGO_PKG_VERSION").to_string(),
        methods,
    }
}

/// Owns the host and runs one request to completion at a time.
pub struct Dispatcher {
    host: EditorHost,
}

impl Dispatcher {
    pub fn new(host: EditorHost) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &EditorHost {
        &self.host
    }

    pub fn dispatch(&mut self, method: &str, params: &Value) -> Result<Value, RemoteError> {
        if method == BATCH_METHOD {
            return self.batch(params);
        }
        let (_, handler) = METHODS
            .iter()
            .find(|(name, _)| *name == method)
            .ok_or_else(|| RemoteError::unknown_method(method))?;
        handler(&mut self.host, Params::new(params)?)
    }

    /// Run `operations` in order.
    ///
    /// With `stop_on_error` (the default) the first failure ends the batch and
    /// is reported with its index, the operation name, how many operations
    /// completed before it, and the underlying error as `cause`. Earlier
    /// operations stay applied.
    pub fn batch(&mut self, params: &Value) -> Result<Value, RemoteError> {
        let p = Params::new(params)?;
        let operations = p
            .value("operations")?
            .as_array()
            .ok_or_else(|| RemoteError::invalid_param("operations", "expected an array"))?;
        let stop_on_error = p.bool_or("stop_on_error", true)?;

        let no_params = Value::Null;
        let mut results = Vec::with_capacity(operations.len());
        let mut failed = 0usize;
        for (index, entry) in operations.iter().enumerate() {
            let operation = entry
                .get("operation")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    RemoteError::invalid_param(
                        "operations",
                        format!("entry {index} has no 'operation'"),
                    )
                })?;
            let outcome = if operation == BATCH_METHOD {
                Err(RemoteError::invalid_state("batches cannot be nested"))
            } else {
                self.dispatch(operation, entry.get("params").unwrap_or(&no_params))
            };

            match outcome {
                Ok(result) => results.push(json!({
                    "operation": operation,
                    "ok": true,
                    "result": result,
                })),
                Err(cause) if stop_on_error => {
                    tracing::debug!("batch stopped at {} ({}): {}", index, operation, cause);
                    return Err(RemoteError::failed(format!(
                        "operation {index} ({operation}) failed: {}",
                        cause.message
                    ))
                    .with_detail("index", index)
                    .with_detail("operation", operation)
                    .with_detail("completed", results.len())
                    .with_detail("cause", json!(cause)));
                }
                Err(cause) => {
                    failed += 1;
                    results.push(json!({
                        "operation": operation,
                        "ok": false,
                        "error": cause,
                    }));
                }
            }
        }

        Ok(json!({
            "completed": results.len() - failed,
            "failed": failed,
            "results": results,
        }))
    }
}
