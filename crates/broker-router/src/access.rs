use std::collections::HashMap;

use thiserror::Error;

/// One role's allow-list for a single verb (SUBSCRIBE, PUBLISH, or SET).
///
/// Grounded in `original_source/src/rbac.c`'s `parse_list`: a comma-separated list is
/// either the literal `*` (allow-all) or a set of literal/`prefix*` patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    All,
    Patterns(Vec<String>),
}

impl AllowList {
    fn matches(&self, candidate: &str) -> bool {
        match self {
            AllowList::All => true,
            AllowList::Patterns(patterns) => patterns.iter().any(|p| match_pattern(p, candidate)),
        }
    }
}

/// One `[role:<name>]` section: allow-lists for the three verbs the spec dispatches
/// access checks against.
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub subscribe: AllowList,
    pub publish: AllowList,
    pub set: AllowList,
}

/// Matches the uniform rule resolved in §4.4 / §9's first Open Question: `*` matches
/// anything, a trailing `*` matches by literal prefix, otherwise exact equality. Applied
/// identically to role name-lists and to the identity->role map, per the spec's
/// resolution of the source's inconsistent pairing.
pub fn match_pattern(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => pattern == candidate,
    }
}

#[derive(Debug, Error)]
pub enum AccessPolicyError {
    #[error("failed to read access policy file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The loaded, read-only access-control tables: roles keyed by name, plus the ordered
/// identity-pattern -> role-name mapping. Immutable after load, so no lock is needed
/// (§5: "Access policy tables: read-only after startup; no lock needed").
pub struct AccessPolicy {
    roles: HashMap<String, Role>,
    identity_map: Vec<(String, String)>,
}

impl AccessPolicy {
    pub fn empty() -> Self {
        Self {
            roles: HashMap::new(),
            identity_map: Vec::new(),
        }
    }

    pub fn from_str(text: &str) -> Self {
        let mut roles = HashMap::new();
        let mut identity_map = Vec::new();

        enum Section<'a> {
            None,
            Role(&'a str),
            Map,
        }
        let mut section = Section::None;
        let mut current: Option<Role> = None;

        let flush = |roles: &mut HashMap<String, Role>, current: &mut Option<Role>| {
            if let Some(role) = current.take() {
                roles.insert(role.name.clone(), role);
            }
        };

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(stripped) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                flush(&mut roles, &mut current);
                if let Some(role_name) = stripped.strip_prefix("role:") {
                    current = Some(Role {
                        name: role_name.to_owned(),
                        subscribe: AllowList::Patterns(Vec::new()),
                        publish: AllowList::Patterns(Vec::new()),
                        set: AllowList::Patterns(Vec::new()),
                    });
                    section = Section::Role(role_name);
                } else if stripped == "map" {
                    section = Section::Map;
                } else {
                    section = Section::None;
                }
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match section {
                Section::Map => {
                    identity_map.push((key.to_owned(), value.to_owned()));
                }
                Section::Role(_) => {
                    if let Some(role) = current.as_mut() {
                        let list = parse_list(value);
                        match key {
                            "SUBSCRIBE" => role.subscribe = list,
                            "PUBLISH" => role.publish = list,
                            "SET" => role.set = list,
                            _ => {}
                        }
                    }
                }
                Section::None => {}
            }
        }
        flush(&mut roles, &mut current);

        Self {
            roles,
            identity_map,
        }
    }

    pub fn load(path: &std::path::Path) -> Result<Self, AccessPolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| AccessPolicyError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_str(&text))
    }

    fn role_for(&self, identity: &str) -> Option<&Role> {
        let role_name = self
            .identity_map
            .iter()
            .find(|(pattern, _)| match_pattern(pattern, identity))
            .map(|(_, role_name)| role_name.as_str())?;
        self.roles.get(role_name)
    }

    pub fn can_subscribe(&self, identity: &str, topic: &str) -> bool {
        self.role_for(identity).is_some_and(|r| r.subscribe.matches(topic))
    }

    pub fn can_unsubscribe(&self, identity: &str, topic: &str) -> bool {
        // The spec gives UNSUBSCRIBE its own predicate name but no distinct rule; an
        // agent may always unsubscribe from what it was allowed to subscribe to.
        self.can_subscribe(identity, topic)
    }

    pub fn can_publish(&self, identity: &str, topic: &str) -> bool {
        self.role_for(identity).is_some_and(|r| r.publish.matches(topic))
    }

    pub fn can_set(&self, identity: &str, key: &str) -> bool {
        self.role_for(identity).is_some_and(|r| r.set.matches(key))
    }
}

fn parse_list(value: &str) -> AllowList {
    if value.trim() == "*" {
        return AllowList::All;
    }
    let patterns: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    AllowList::Patterns(patterns)
}
