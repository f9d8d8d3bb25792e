//! Minimal robots.txt evaluator (spec §4.2, SPEC_FULL.md §10).
//!
//! Only what the Host Registry needs: parse `User-agent`/`Disallow`/
//! `Allow` groups and answer "is this path allowed for our user agent".
//! A missing or empty file (404) is treated as "allow everything"
//! (spec §4.2).

#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    prefix: String,
}

impl RobotsPolicy {
    /// Empty rule set: everything allowed. Used for 404 responses and for
    /// hosts where robots checking is disabled.
    pub fn allow_all() -> Self {
        RobotsPolicy { rules: Vec::new() }
    }

    pub fn parse(body: &str, user_agent: &str) -> Self {
        let mut groups: Vec<(Vec<String>, Vec<Rule>)> = Vec::new();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules: Vec<Rule> = Vec::new();
        let mut in_group = false;

        for raw_line in body.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_group && !current_rules.is_empty() {
                        groups.push((std::mem::take(&mut current_agents), std::mem::take(&mut current_rules)));
                        current_agents.clear();
                    }
                    current_agents.push(value.to_lowercase());
                    in_group = true;
                }
                "disallow" => {
                    in_group = false;
                    if !value.is_empty() {
                        current_rules.push(Rule { allow: false, prefix: value.to_string() });
                    } else {
                        // Empty Disallow means "allow everything".
                        current_rules.push(Rule { allow: true, prefix: String::new() });
                    }
                }
                "allow" => {
                    in_group = false;
                    current_rules.push(Rule { allow: true, prefix: value.to_string() });
                }
                _ => {}
            }
        }
        if !current_agents.is_empty() {
            groups.push((current_agents, current_rules));
        }

        let wanted = user_agent.to_lowercase();
        let mut rules = groups
            .iter()
            .find(|(agents, _)| agents.iter().any(|a| a == &wanted))
            .map(|(_, rules)| rules.clone());
        if rules.is_none() {
            rules = groups
                .iter()
                .find(|(agents, _)| agents.iter().any(|a| a == "*"))
                .map(|(_, rules)| rules.clone());
        }
        RobotsPolicy { rules: rules.unwrap_or_default() }
    }

    /// True if `path` may be fetched. Longest matching rule wins, as is
    /// conventional for robots.txt; ties prefer `Allow`.
    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best: Option<&Rule> = None;
        for rule in &self.rules {
            if path.starts_with(&rule.prefix) {
                match best {
                    None => best = Some(rule),
                    Some(b) if rule.prefix.len() > b.prefix.len() => best = Some(rule),
                    Some(b) if rule.prefix.len() == b.prefix.len() && rule.allow && !b.allow => best = Some(rule),
                    _ => {}
                }
            }
        }
        best.map(|r| r.allow).unwrap_or(true)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}
