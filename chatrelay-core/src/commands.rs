// ABOUTME: Slash-command parsing and the closed table of supported commands.
// ABOUTME: Handles Telegram-style "/name@bot args" addressing and quoted arguments.

/// Represents a parsed command from a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The command name (without the slash or @bot suffix), lowercased
    pub name: String,
    /// Parsed arguments (handles quoted strings)
    pub args: Vec<String>,
    /// The raw argument string after the command name
    pub raw_args: String,
}

impl Command {
    /// Create a new command with name and arguments
    pub fn new(name: impl Into<String>, args: Vec<String>, raw_args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            raw_args: raw_args.into(),
        }
    }

    /// Get the first argument if present
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    /// The closed command kind, if the name is one we support
    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::lookup(&self.name)
    }
}

/// Result of parsing a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// A command addressed to this bot (or to nobody in particular)
    Command(Command),
    /// A regular message (not a command)
    Message(String),
    /// A command addressed to a different bot
    Ignore,
}

impl ParseResult {
    /// Get the command if this is one
    pub fn as_command(&self) -> Option<&Command> {
        match self {
            ParseResult::Command(cmd) => Some(cmd),
            _ => None,
        }
    }
}

/// Parse arguments from a string, respecting quoted strings
fn parse_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = '"';

    for c in input.chars() {
        match c {
            '"' | '\'' if !in_quotes => {
                in_quotes = true;
                quote_char = c;
            }
            c if c == quote_char && in_quotes => {
                in_quotes = false;
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Parse a chat message to determine if it's a command
///
/// Recognizes `/command args` and `/command@botname args`. A command whose
/// `@botname` suffix names a different bot yields `ParseResult::Ignore`;
/// the comparison is case-insensitive.
pub fn parse_message(text: &str, bot_username: &str) -> ParseResult {
    let trimmed = text.trim();

    let Some(after_slash) = trimmed.strip_prefix('/') else {
        return ParseResult::Message(trimmed.to_string());
    };
    // "/" alone or "/ text" is a regular message
    if !after_slash.chars().next().is_some_and(|c| c.is_alphanumeric()) {
        return ParseResult::Message(trimmed.to_string());
    }

    let (head, rest) = match after_slash.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (after_slash, ""),
    };

    let name = match head.split_once('@') {
        Some((name, target)) => {
            if !target.eq_ignore_ascii_case(bot_username) {
                return ParseResult::Ignore;
            }
            name
        }
        None => head,
    };

    ParseResult::Command(Command::new(name.to_lowercase(), parse_args(rest), rest))
}

// =============================================================================
// Command table
// =============================================================================

/// Every command the bot understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Start,
    Help,
    Clear,
    History,
    Rollback,
    Temperature,
    Model,
    System,
    Markdown,
    Translate,
    Grammar,
    Enhance,
    Summarize,
    Imagine,
}

/// Name, kind and menu description of each command, in menu order
pub const COMMAND_TABLE: &[(&str, CommandKind, &str)] = &[
    ("start", CommandKind::Start, "Start the conversation"),
    ("help", CommandKind::Help, "Show available commands"),
    ("clear", CommandKind::Clear, "Forget the conversation history"),
    ("history", CommandKind::History, "Show the conversation history"),
    ("rollback", CommandKind::Rollback, "Remove the last N exchanges"),
    ("temperature", CommandKind::Temperature, "Show or set sampling temperature (0.0-2.0)"),
    ("model", CommandKind::Model, "Show or set the completion model"),
    ("system", CommandKind::System, "Show or set the system prompt"),
    ("markdown", CommandKind::Markdown, "Show or toggle Markdown replies (on/off)"),
    ("translate", CommandKind::Translate, "Translate text"),
    ("grammar", CommandKind::Grammar, "Fix grammar and spelling"),
    ("enhance", CommandKind::Enhance, "Improve the wording of text"),
    ("summarize", CommandKind::Summarize, "Summarize the recent chat"),
    ("imagine", CommandKind::Imagine, "Generate an image from a description"),
];

impl CommandKind {
    /// Resolve a command name through the table
    pub fn lookup(name: &str) -> Option<Self> {
        COMMAND_TABLE
            .iter()
            .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, kind, _)| *kind)
    }

    pub fn name(self) -> &'static str {
        self.entry().0
    }

    pub fn description(self) -> &'static str {
        self.entry().2
    }

    fn entry(self) -> &'static (&'static str, CommandKind, &'static str) {
        COMMAND_TABLE
            .iter()
            .find(|(_, kind, _)| *kind == self)
            .unwrap_or(&COMMAND_TABLE[0])
    }

    /// (name, description) pairs for a platform command menu
    pub fn menu() -> Vec<(&'static str, &'static str)> {
        COMMAND_TABLE.iter().map(|(n, _, d)| (*n, *d)).collect()
    }
}
