//! Bus policy document model and its XML rendering.
//!
//! Rendering is a pure function of the model, and the model only holds
//! ordered collections, so equal models always render byte-identical output.

use std::collections::BTreeMap;
use std::fmt::Write;

const DOCTYPE: &str = "<!DOCTYPE busconfig PUBLIC \"-//freedesktop//DTD D-BUS Bus Configuration 1.0//EN\"\n \"http://www.freedesktop.org/standards/dbus/1.0/busconfig.dtd\">";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Allow,
    Deny,
}

impl Action {
    fn tag(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Deny => "deny",
        }
    }
}

/// One `<allow .../>` or `<deny .../>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    pub action: Action,
    pub attrs: Vec<(&'static str, String)>,
}

impl PolicyEntry {
    pub fn allow(attrs: Vec<(&'static str, String)>) -> Self {
        Self {
            action: Action::Allow,
            attrs,
        }
    }

    pub fn deny(attrs: Vec<(&'static str, String)>) -> Self {
        Self {
            action: Action::Deny,
            attrs,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    fn render(&self, indent: &str, out: &mut String) {
        let _ = write!(out, "{indent}<{}", self.action.tag());
        for (k, v) in &self.attrs {
            let _ = write!(out, " {k}=\"{}\"", escape_attr(v));
        }
        let _ = writeln!(out, "/>");
    }
}

/// Everything one app's OS user may do on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPolicy {
    pub user: String,
    pub entries: Vec<PolicyEntry>,
}

impl UserPolicy {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{DOCTYPE}");
        let _ = writeln!(out, "<busconfig>");
        let _ = writeln!(out, "  <policy user=\"{}\">", escape_attr(&self.user));
        for e in &self.entries {
            e.render("    ", &mut out);
        }
        let _ = writeln!(out, "  </policy>");
        let _ = writeln!(out, "</busconfig>");
        out
    }
}

/// Global document: lets every app user connect and pulls in the per-app files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPolicy {
    pub include_dir: String,
    pub users: Vec<String>,
}

impl DefaultPolicy {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{DOCTYPE}");
        let _ = writeln!(out, "<busconfig>");
        let _ = writeln!(out, "  <includedir>{}</includedir>", escape_text(&self.include_dir));
        let _ = writeln!(out, "  <policy context=\"default\">");
        for user in &self.users {
            let _ = writeln!(out, "    <allow user=\"{}\"/>", escape_attr(user));
        }
        let _ = writeln!(out, "  </policy>");
        let _ = writeln!(out, "</busconfig>");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPolicy {
    pub default: DefaultPolicy,
    /// Keyed by app id, which is also the OS user name.
    pub apps: BTreeMap<String, UserPolicy>,
}

fn escape_text(v: &str) -> String {
    v.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(v: &str) -> String {
    escape_text(v).replace('"', "&quot;").replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_user_policy() {
        let p = UserPolicy {
            user: "lights".into(),
            entries: vec![
                PolicyEntry::deny(vec![("send_type", "*".into())]),
                PolicyEntry::allow(vec![
                    ("receive_type", "method_call".into()),
                    ("receive_path", "/a\"b".into()),
                ]),
            ],
        };
        let xml = p.render();
        assert!(xml.contains("<policy user=\"lights\">"));
        assert!(xml.contains("    <deny send_type=\"*\"/>\n"));
        assert!(xml.contains("<allow receive_type=\"method_call\" receive_path=\"/a&quot;b\"/>"));
    }

    #[test]
    fn renders_default_policy() {
        let d = DefaultPolicy {
            include_dir: "/etc/aclgate/policy/apps".into(),
            users: vec!["a".into(), "b".into()],
        };
        let xml = d.render();
        assert!(xml.contains("<includedir>/etc/aclgate/policy/apps</includedir>"));
        assert!(xml.contains("<allow user=\"a\"/>\n    <allow user=\"b\"/>"));
    }
}
