//! jail(8) configuration generation.
//!
//! Parameters are merged in a fixed order, later sources overriding
//! earlier ones:
//!
//! 1. fixed policy ([`JAIL_POLICY`])
//! 2. host identity: `host.hostuuid`, `interface`, `path`, `host.hostname`
//! 3. `ip4.addr` from the `ip-address` annotation
//! 4. `jetpack/jail.conf/*` annotations, with `-` mapped to `_`
//!
//! The rendered file is deterministic: one `  key="value";` line per
//! parameter, sorted by the rendered line.

use super::Pod;
use crate::constants::{
    HOSTNAME_ANNOTATION, IP_ADDRESS_ANNOTATION, JAIL_CONF_ANNOTATION_PREFIX, JAIL_CONF_FILE,
    JAIL_POLICY, PROP_JAIL_INTERFACE, ROOTFS_DIR,
};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// A pod's jail configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JailConf {
    name: String,
    params: BTreeMap<String, String>,
}

impl JailConf {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

}

impl fmt::Display for JailConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("  {k}={};", quote(v)))
            .collect();
        lines.sort();

        writeln!(f, "{} {{", quote(&self.name))?;
        writeln!(f, "{}", lines.join("\n"))?;
        writeln!(f, "}}")
    }
}

/// Double-quotes a value for jail.conf(5).
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl Pod {
    /// Builds the jail configuration from host properties and annotations.
    ///
    /// # Errors
    ///
    /// - `MissingProperty` if `jail.namePrefix` or `jail.interface` is unset
    /// - `Fatal` if the pod has no `ip-address` annotation
    pub fn jail_conf(&self) -> Result<JailConf> {
        let uuid = self.uuid.to_string();
        let annotations = &self.manifest.annotations;
        let mut conf = JailConf::new(self.jail_name()?);

        for (key, value) in JAIL_POLICY {
            conf.set(*key, *value);
        }

        conf.set("host.hostuuid", uuid.as_str());
        conf.set(
            "interface",
            self.host.properties().must_get_string(PROP_JAIL_INTERFACE)?,
        );
        conf.set(
            "path",
            self.path([ROOTFS_DIR]).to_string_lossy().into_owned(),
        );
        conf.set(
            "host.hostname",
            annotations.get(HOSTNAME_ANNOTATION).unwrap_or(&uuid),
        );

        let ip = annotations.get(IP_ADDRESS_ANNOTATION).ok_or_else(|| {
            Error::Fatal(format!("pod {uuid} has no {IP_ADDRESS_ANNOTATION} annotation"))
        })?;
        conf.set("ip4.addr", ip);

        for annotation in annotations.iter() {
            if let Some(param) = annotation.name.strip_prefix(JAIL_CONF_ANNOTATION_PREFIX) {
                conf.set(param.replace('-', "_"), annotation.value.as_str());
            }
        }

        Ok(conf)
    }

    /// The jail.conf the pod's jail is run with: the prepared file when
    /// one exists, else the configuration generated from the manifest.
    ///
    /// Only the prepared file carries `mount.fstab`.
    pub fn effective_jail_conf(&self) -> Result<String> {
        let path = self.path([JAIL_CONF_FILE]);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(self.jail_conf()?.to_string())
            }
            Err(e) => Err(Error::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_sorts_by_line() {
        let mut conf = JailConf::new("jp-1");
        conf.set("persist", "true");
        conf.set("mount", "x");
        conf.set("mount.devfs", "true");

        assert_eq!(
            conf.to_string(),
            "\"jp-1\" {\n  mount.devfs=\"true\";\n  mount=\"x\";\n  persist=\"true\";\n}\n"
        );
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
        assert_eq!(quote("plain"), "\"plain\"");
    }
}
