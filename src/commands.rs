/// Dialogue commands a user can issue at any point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Generate,
    Cancel,
}

pub fn parse_command(input: &str) -> Option<Command> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let mut cmd = parts.next()?.to_lowercase();
    // Group chats address commands as /generate@botname.
    if let Some(at) = cmd.find('@') {
        cmd.truncate(at);
    }

    match cmd.as_str() {
        "/start" => Some(Command::Start),
        "/generate" => Some(Command::Generate),
        "/cancel" => Some(Command::Cancel),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_command() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
    }

    #[test]
    fn generate_command() {
        assert_eq!(parse_command("/generate"), Some(Command::Generate));
    }

    #[test]
    fn cancel_command() {
        assert_eq!(parse_command("/cancel"), Some(Command::Cancel));
    }

    #[test]
    fn commands_are_case_insensitive() {
        assert_eq!(parse_command("/GENERATE"), Some(Command::Generate));
    }

    #[test]
    fn botname_suffix_is_stripped() {
        assert_eq!(parse_command("/generate@stamp_bot"), Some(Command::Generate));
        assert_eq!(parse_command("/START@stamp_bot"), Some(Command::Start));
    }

    #[test]
    fn extra_args_are_ignored() {
        assert_eq!(parse_command("/cancel please"), Some(Command::Cancel));
    }

    #[test]
    fn leading_whitespace_accepted() {
        assert_eq!(parse_command("  /start"), Some(Command::Start));
    }

    #[test]
    fn plain_text_returns_none() {
        assert_eq!(parse_command("320,5"), None);
    }

    #[test]
    fn unknown_command_returns_none() {
        assert_eq!(parse_command("/stamp"), None);
    }

    #[test]
    fn empty_input_returns_none() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("   "), None);
    }
}
