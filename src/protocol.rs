#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `%q` / `%Q`, or the input stream closed.
    Quit,
    /// `%c` / `%C`: forget the context, keep the session.
    ResetContext,
    Prompt(String),
}

impl ConsoleCommand {
    /// Parses one raw line as returned by `read_line`; `None` is end of input.
    pub fn parse(line: Option<&str>) -> Self {
        let Some(line) = line else {
            return ConsoleCommand::Quit;
        };
        let text = line.trim_end_matches(['\n', '\r']);

        match text {
            "%q" | "%Q" => ConsoleCommand::Quit,
            "%c" | "%C" => ConsoleCommand::ResetContext,
            _ => ConsoleCommand::Prompt(text.to_string()),
        }
    }
}
