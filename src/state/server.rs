//! The `Server` entity and SQUIT cascade (spec §3, §8 "SQUIT cascade").

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Server {
    pub sid: String,
    pub name: String,
    pub description: String,
    pub uplink_sid: Option<String>,
    pub children: HashSet<String>,
    pub users: HashSet<String>,
    pub has_eob: bool,
}

impl Server {
    pub fn new(sid: impl Into<String>, name: impl Into<String>, uplink_sid: Option<String>) -> Self {
        Self {
            sid: sid.into(),
            name: name.into(),
            description: String::new(),
            uplink_sid,
            children: HashSet::new(),
            users: HashSet::new(),
            has_eob: false,
        }
    }
}

/// All SIDs in the subtree rooted at `root` (inclusive), computed from the
/// server table's child pointers. Used by SQUIT to enumerate descendants
/// before tearing anything down.
pub fn descendant_sids(servers: &std::collections::HashMap<String, Server>, root: &str) -> Vec<String> {
    let mut out = vec![root.to_string()];
    let mut stack = vec![root.to_string()];
    while let Some(sid) = stack.pop() {
        if let Some(server) = servers.get(&sid) {
            for child in &server.children {
                out.push(child.clone());
                stack.push(child.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn descendant_sids_enumerates_whole_subtree() {
        let mut servers = HashMap::new();
        let mut root = Server::new("1AA", "root.example", None);
        root.children.insert("1AB".into());
        servers.insert("1AA".to_string(), root);
        let mut mid = Server::new("1AB", "mid.example", Some("1AA".into()));
        mid.children.insert("1AC".into());
        servers.insert("1AB".to_string(), mid);
        servers.insert("1AC".to_string(), Server::new("1AC", "leaf.example", Some("1AB".into())));

        let mut sids = descendant_sids(&servers, "1AB");
        sids.sort();
        assert_eq!(sids, vec!["1AB".to_string(), "1AC".to_string()]);
    }
}
