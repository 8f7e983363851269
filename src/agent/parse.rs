//! Extraction of `Thought:` / `Action:` replies and validation against the
//! environment's admissible commands.

use thiserror::Error;

use crate::state::normalize_action;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionParseError {
    #[error("no 'Action:' line found")]
    NoActionLine,

    #[error("the 'Action:' line is empty")]
    EmptyAction,

    #[error("'{0}' is not an admissible action")]
    NotAdmissible(String),

    #[error("'{0}' already failed in this episode")]
    KnownFailure(String),
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label)
        .then(|| line[label.len()..].trim())
}

/// Split a reply into `(thought, action)`.
///
/// The last line starting with `Action:` (any case) wins, so an earlier
/// mention inside the reasoning is ignored. Everything before it is the
/// thought, minus a leading `Thought:` label.
pub fn parse_action(response: &str) -> Result<(String, String), ActionParseError> {
    let lines: Vec<&str> = response.lines().collect();
    let idx = lines
        .iter()
        .rposition(|line| strip_label(line.trim(), "action:").is_some())
        .ok_or(ActionParseError::NoActionLine)?;

    let action = strip_label(lines[idx].trim(), "action:")
        .unwrap_or_default()
        .trim()
        .trim_end_matches('.')
        .trim_end()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .trim()
        .trim_end_matches('.')
        .trim_end();
    if action.is_empty() {
        return Err(ActionParseError::EmptyAction);
    }

    let reasoning = lines[..idx].join("\n");
    let reasoning = reasoning.trim();
    let thought = strip_label(reasoning, "thought:").unwrap_or(reasoning);

    Ok((thought.to_string(), action.to_string()))
}

/// Map `action` onto the admissible list: exact match first, then a match
/// after normalization. Without a list every action is accepted.
pub fn resolve_admissible(
    action: &str,
    admissible: Option<&[String]>,
) -> Result<String, ActionParseError> {
    let Some(admissible) = admissible.filter(|a| !a.is_empty()) else {
        return Ok(action.to_string());
    };
    if admissible.iter().any(|a| a == action) {
        return Ok(action.to_string());
    }
    let wanted = normalize_action(action);
    admissible
        .iter()
        .find(|a| normalize_action(a) == wanted)
        .cloned()
        .ok_or_else(|| ActionParseError::NotAdmissible(action.to_string()))
}

/// The action to send when the model gave nothing usable: `preferred` when
/// it is admissible (or no list is known), otherwise the first admissible
/// action.
pub fn fallback_action(preferred: &str, admissible: Option<&[String]>) -> String {
    match resolve_admissible(preferred, admissible) {
        Ok(action) => action,
        Err(_) => admissible
            .and_then(|a| a.first())
            .cloned()
            .unwrap_or_else(|| preferred.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thought_and_action() {
        let (thought, action) =
            parse_action("Thought: the mug is probably on the counter.\nAction: go to countertop 1")
                .unwrap();
        assert_eq!(thought, "the mug is probably on the counter.");
        assert_eq!(action, "go to countertop 1");
    }

    #[test]
    fn last_action_line_wins() {
        let (thought, action) =
            parse_action("I considered Action: look around\nBut instead:\n\nACTION: go to table 2")
                .unwrap();
        assert_eq!(action, "go to table 2");
        assert!(thought.contains("Action: look around"));
    }

    #[test]
    fn decorations_are_trimmed() {
        let (_, action) = parse_action("Action: `open fridge 1`.").unwrap();
        assert_eq!(action, "open fridge 1");
        let (_, action) = parse_action("action: \"search[red shoes]\"").unwrap();
        assert_eq!(action, "search[red shoes]");
        let (_, action) = parse_action("Action: 'go to desk 1.'").unwrap();
        assert_eq!(action, "go to desk 1");
    }

    #[test]
    fn malformed_replies() {
        assert_eq!(
            parse_action("I will pick up the mug."),
            Err(ActionParseError::NoActionLine)
        );
        assert_eq!(parse_action("Thought: hmm\nAction:   "), Err(ActionParseError::EmptyAction));
        assert_eq!(parse_action(""), Err(ActionParseError::NoActionLine));
    }

    #[test]
    fn admissible_resolution() {
        let admissible = vec!["go to fridge 1".to_string(), "open drawer 1".to_string()];
        assert_eq!(
            resolve_admissible("go to fridge 1", Some(&admissible)).unwrap(),
            "go to fridge 1"
        );
        assert_eq!(
            resolve_admissible("Open  drawer_1", Some(&admissible)).unwrap(),
            "open drawer 1"
        );
        assert_eq!(
            resolve_admissible("fly away", Some(&admissible)),
            Err(ActionParseError::NotAdmissible("fly away".into()))
        );
        assert_eq!(resolve_admissible("fly away", None).unwrap(), "fly away");
    }

    #[test]
    fn fallback_respects_the_admissible_list() {
        assert_eq!(fallback_action("look", None), "look");
        let admissible = vec!["search[shoes]".to_string(), "click[Back to Search]".to_string()];
        assert_eq!(
            fallback_action("click[back to search]", Some(&admissible)),
            "click[Back to Search]"
        );
        assert_eq!(fallback_action("look", Some(&admissible)), "search[shoes]");
    }
}
