//! In-memory stand-in for a remote server, scripted per test

use crate::{
    config::UpdateConfig,
    odoo_client::{MockRemoteClient, RpcError},
};
use serde_json::{Value, json};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

type UpgradeHandler = Arc<dyn Fn(&Value) -> Result<Value, RpcError> + Send + Sync>;
type TranslationHandler = Arc<dyn Fn(&str, &Value) -> Result<Value, RpcError> + Send + Sync>;

#[derive(Clone, Copy)]
enum Login {
    Accept,
    Reject,
    Refuse,
}

#[derive(Clone)]
pub struct ScriptedServer {
    version: String,
    login: Login,
    modules: Vec<(String, i64)>,
    installed: Vec<i64>,
    languages: Vec<String>,
    lookup_faults: Vec<(String, String)>,
    upgrade: UpgradeHandler,
    translation: TranslationHandler,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedServer {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            login: Login::Accept,
            modules: vec![],
            installed: vec![1, 2],
            languages: vec![],
            lookup_faults: vec![],
            upgrade: Arc::new(|_| Ok(reload_action())),
            translation: Arc::new(|_, _| Ok(json!({"status": true}))),
            calls: Arc::default(),
        }
    }

    pub fn with_modules(mut self, modules: &[(&str, i64)]) -> Self {
        self.modules = modules
            .iter()
            .map(|(name, id)| (name.to_string(), *id))
            .collect();
        self
    }

    pub fn with_installed(mut self, ids: &[i64]) -> Self {
        self.installed = ids.to_vec();
        self
    }

    pub fn with_languages(mut self, codes: &[&str]) -> Self {
        self.languages = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn deny_lookup_of(self, module: &str) -> Self {
        self.fail_lookup_of(module, "odoo.exceptions.AccessError: Access denied")
    }

    pub fn fail_lookup_of(mut self, module: &str, message: &str) -> Self {
        self.lookup_faults
            .push((module.to_string(), message.to_string()));
        self
    }

    pub fn refuse_connection(mut self) -> Self {
        self.login = Login::Refuse;
        self
    }

    pub fn reject_login(mut self) -> Self {
        self.login = Login::Reject;
        self
    }

    pub fn on_upgrade(
        mut self,
        handler: impl Fn(&Value) -> Result<Value, RpcError> + Send + Sync + 'static,
    ) -> Self {
        self.upgrade = Arc::new(handler);
        self
    }

    /// `handler` receives the method name and the keyword arguments
    pub fn on_translation(
        mut self,
        handler: impl Fn(&str, &Value) -> Result<Value, RpcError> + Send + Sync + 'static,
    ) -> Self {
        self.translation = Arc::new(handler);
        self
    }

    pub fn client(&self) -> MockRemoteClient {
        let mut client = MockRemoteClient::new();

        let server = self.clone();
        client
            .expect_common()
            .returning(move |method, _| server.common(method));

        let server = self.clone();
        client
            .expect_object()
            .returning(move |_, params| server.object(&params));

        client
    }

    /// `model.method args` of every `execute_kw` received so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn upgrade_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.contains(".button_immediate_upgrade "))
            .count()
    }

    fn common(&self, method: &str) -> Result<Value, RpcError> {
        if let Login::Refuse = self.login {
            return Err(RpcError::ConnectionRefused {
                url: "http://erp:8069/xmlrpc/2/common".to_string(),
                reason: "Connection refused (os error 111)".to_string(),
            });
        }

        match (method, self.login) {
            ("version", _) => Ok(json!({"server_version": self.version})),
            ("authenticate", Login::Reject) => Ok(json!(false)),
            ("authenticate", _) => Ok(json!(2)),
            _ => Err(RpcError::Protocol(format!("unexpected common call {method}"))),
        }
    }

    fn object(&self, params: &[Value]) -> Result<Value, RpcError> {
        let model = params[3].as_str().unwrap_or_default();
        let method = params[4].as_str().unwrap_or_default();
        let args = &params[5];
        let kwargs = params.get(6).cloned().unwrap_or(Value::Null);

        self.calls
            .lock()
            .expect("calls lock should not be poisoned")
            .push(format!("{model}.{method} {args}"));

        let field = args[0][0][0].as_str().unwrap_or_default();
        let value = args[0][0][2].as_str().unwrap_or_default();

        match (model, method, field) {
            ("ir.module.module", "search", "name") => {
                if let Some((_, message)) = self.lookup_faults.iter().find(|(m, _)| m == value) {
                    return Err(fault(message));
                }
                let ids: Vec<i64> = self
                    .modules
                    .iter()
                    .filter(|(name, _)| name == value)
                    .map(|(_, id)| *id)
                    .collect();
                Ok(json!(ids))
            }
            ("ir.module.module", "search", "state") => Ok(json!(self.installed)),
            ("ir.module.module", "button_immediate_upgrade", _) => (self.upgrade)(args),
            ("ir.module.module", "remote_update_translation" | "update_translations", _) => {
                (self.translation)(method, &kwargs)
            }
            ("res.lang", "search", _) => {
                if self.languages.iter().any(|code| code == value) {
                    Ok(json!([1]))
                } else {
                    Ok(json!([]))
                }
            }
            _ => Err(RpcError::Protocol(format!(
                "unexpected call {model}.{method}"
            ))),
        }
    }
}

pub fn fault(message: &str) -> RpcError {
    RpcError::Fault {
        code: "1".to_string(),
        message: message.to_string(),
    }
}

pub fn reload_action() -> Value {
    json!({"type": "ir.actions.client", "tag": "reload"})
}

pub fn config(modules: &[&str], language: &str) -> UpdateConfig {
    UpdateConfig {
        url: "http://erp:8069".to_string(),
        db: "prod".to_string(),
        username: "admin".to_string(),
        password: "secret".to_string(),
        modules_to_update: modules.iter().map(|m| m.to_string()).collect(),
        language_to_update: language.to_string(),
        source_path: PathBuf::from("/etc/erp/prod.json"),
    }
}
