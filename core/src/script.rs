//! Client-side behaviors wired into widgets, and the script library the
//! page includes for them. Only behaviors actually used by the rendered
//! form are shipped.

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClientBehavior {
    /// Clone a template row into a growable list.
    AddRow,
    /// Remove the row containing the clicked control.
    RemoveRow,
    /// Reveal or hide an optional single-slot field.
    Toggle,
    /// A function referenced by a `<dest>.handlers` hook.
    Named(String),
}

impl ClientBehavior {
    /// Resolve a function name found in a handler script.
    pub fn from_function(name: &str) -> Self {
        match name {
            "add_row" => ClientBehavior::AddRow,
            "remove_row" => ClientBehavior::RemoveRow,
            "toggle_slot" => ClientBehavior::Toggle,
            other => ClientBehavior::Named(other.to_string()),
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            ClientBehavior::AddRow => "add_row",
            ClientBehavior::RemoveRow => "remove_row",
            ClientBehavior::Toggle => "toggle_slot",
            ClientBehavior::Named(name) => name,
        }
    }

    /// Library source for this behavior, if the library knows it. Handlers
    /// may call functions provided by the page template itself.
    pub fn snippet(&self) -> Option<&'static str> {
        match self {
            ClientBehavior::AddRow => Some(ADD_ROW),
            ClientBehavior::RemoveRow => Some(REMOVE_ROW),
            ClientBehavior::Toggle => Some(TOGGLE_SLOT),
            ClientBehavior::Named(name) if name == "copy_v" => Some(COPY_V),
            ClientBehavior::Named(_) => None,
        }
    }
}

const ADD_ROW: &str = r#"
function add_row(name) {
    var tpl = document.getElementById(name + '.tpl'),
        add = document.getElementById(name + '.add');
    add.parentNode.insertBefore(tpl.content.cloneNode(true), add);
}"#;

const REMOVE_ROW: &str = r#"
function remove_row(node) {
    while (node.tagName != 'LI') {
        node = node.parentNode;
    }
    node.remove();
}"#;

const TOGGLE_SLOT: &str = r#"
function toggle_slot(name, show) {
    var add = document.getElementById(name + '.add'),
        slot = document.getElementById(name + '.slot');
    add.style.display = show ? 'none' : '';
    slot.style.display = show ? '' : 'none';
    slot.querySelectorAll('input, select').forEach(function (el) {
        if (el.type != 'button') {
            el.disabled = !show;
        }
    });
}"#;

const COPY_V: &str = r#"
function stripext(path) {
    var rsep = Math.max(path.lastIndexOf('\\'), path.lastIndexOf('/'));
    var rdot = path.lastIndexOf('.');
    var fname = rsep + 1;
    while (fname < rdot) {
        if (path.charAt(fname) != '.') {
            return path.slice(rsep + 1, rdot);
        }
        fname += 1;
    }
    return path.slice(rsep + 1);
}
function copy_v(srcid, dstid) {
    var src = document.getElementById(srcid),
        dst = document.getElementById(dstid);
    dst.value = stripext(src.value) + '.zip';
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_names_round_trip_through_identifiers() {
        for behavior in [
            ClientBehavior::AddRow,
            ClientBehavior::RemoveRow,
            ClientBehavior::Toggle,
            ClientBehavior::Named("copy_v".into()),
        ] {
            assert_eq!(ClientBehavior::from_function(behavior.identifier()), behavior);
        }
    }

    #[test]
    fn snippets_define_their_function() {
        for behavior in [
            ClientBehavior::AddRow,
            ClientBehavior::RemoveRow,
            ClientBehavior::Toggle,
            ClientBehavior::Named("copy_v".into()),
        ] {
            let snippet = behavior.snippet().expect("library behavior");
            assert!(snippet.contains(&format!("function {}(", behavior.identifier())));
        }
        assert!(ClientBehavior::Named("page_defined".into()).snippet().is_none());
    }
}
