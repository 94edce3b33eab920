//! Recursive Descent Parser for Command Lines
//!
//! Consumes tokens from the lexer and produces a `CommandChain`.
//!
//! Grammar (simplified):
//!   chain    ::= pipeline ((&&|'||'|';'|newline) pipeline)*
//!   pipeline ::= command (| command)* [&]
//!   command  ::= (word | redirection)+
//!
//! Empty segments produced by consecutive `;`/newline separators are
//! collapsed silently; a leading `&&`/`||` with no left operand is a
//! syntax error.

use crate::ast::{ChainOperator, Command, CommandChain, Pipeline, Redirection};
use crate::error::ShellError;
use crate::parser::lexer::{Lexer, RedirOp, Token};

/// Parse an input line (possibly multi-line, for here-docs) into a chain.
pub fn parse(input: &str) -> Result<CommandChain, ShellError> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser::new(tokens).parse_chain()
}

/// True when the input forms a complete parse unit. Unterminated quotes,
/// here-docs, line continuations, and trailing binary operators all ask
/// for a continuation line instead of a syntax error.
pub fn is_input_complete(input: &str) -> bool {
    match Lexer::new(input).tokenize() {
        Err(ShellError::Parse(msg)) => !msg.starts_with("unterminated"),
        Err(_) => true,
        Ok(tokens) => {
            for token in tokens.iter().rev() {
                match token {
                    Token::Newline => continue,
                    Token::Pipe | Token::AndAnd | Token::OrOr => return false,
                    _ => return true,
                }
            }
            true
        }
    }
}

/// Token-stream parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse the whole token stream into one chain. Newlines behave like
    /// `;` between pipelines.
    pub fn parse_chain(&mut self) -> Result<CommandChain, ShellError> {
        let mut chain = CommandChain::default();
        let mut pending_op: Option<ChainOperator> = None;

        loop {
            // Collapse empty `;`/newline segments. After `&&`/`||` a
            // newline is a continuation, not a separator.
            while matches!(self.peek(), Some(Token::Semi) | Some(Token::Newline)) {
                self.pos += 1;
            }

            match self.peek() {
                None => break,
                Some(Token::AndAnd) | Some(Token::OrOr) => {
                    let text = match self.advance() {
                        Some(Token::AndAnd) => "&&",
                        _ => "||",
                    };
                    return Err(ShellError::Parse(format!(
                        "unexpected token `{}`",
                        text
                    )));
                }
                Some(Token::Amp) => {
                    self.pos += 1;
                    return Err(ShellError::Parse("unexpected token `&`".to_string()));
                }
                _ => {}
            }

            let mut pipeline = self.parse_pipeline()?;

            // Trailing operator decides backgrounding and the join to the
            // next segment.
            let mut op_after = None;
            match self.peek() {
                Some(Token::Amp) => {
                    self.pos += 1;
                    pipeline.background = true;
                    op_after = Some(ChainOperator::Seq);
                }
                Some(Token::Semi) | Some(Token::Newline) => {
                    self.pos += 1;
                    op_after = Some(ChainOperator::Seq);
                }
                Some(Token::AndAnd) => {
                    self.pos += 1;
                    op_after = Some(ChainOperator::And);
                }
                Some(Token::OrOr) => {
                    self.pos += 1;
                    op_after = Some(ChainOperator::Or);
                }
                None => {}
                Some(other) => {
                    return Err(ShellError::Parse(format!(
                        "unexpected token `{:?}`",
                        other
                    )))
                }
            }

            if let Some(op) = pending_op.take() {
                chain.operators.push(op);
            }
            chain.pipelines.push(pipeline);

            match op_after {
                Some(ChainOperator::Seq) | None => {
                    pending_op = op_after.filter(|_| self.more_segments_ahead());
                    if pending_op.is_none() && self.peek().is_none() {
                        break;
                    }
                    if op_after.is_none() {
                        break;
                    }
                }
                Some(op) => {
                    // && / || require a right operand.
                    self.skip_newlines_for_continuation();
                    if self.peek().is_none() {
                        return Err(ShellError::Parse(format!(
                            "unexpected end of input after `{}`",
                            op.render()
                        )));
                    }
                    pending_op = Some(op);
                }
            }
        }

        Ok(chain)
    }

    /// True if any non-separator token remains.
    fn more_segments_ahead(&self) -> bool {
        self.tokens[self.pos..]
            .iter()
            .any(|t| !matches!(t, Token::Semi | Token::Newline))
    }

    fn skip_newlines_for_continuation(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) {
            self.pos += 1;
        }
    }

    /// Parse commands joined by `|` (not `||`).
    fn parse_pipeline(&mut self) -> Result<Pipeline, ShellError> {
        let mut pipeline = Pipeline::default();
        loop {
            let command = self.parse_command()?;
            if command.words.is_empty() && command.redirections.is_empty() {
                return Err(ShellError::Parse(
                    "expected a command in pipeline".to_string(),
                ));
            }
            pipeline.commands.push(command);
            if matches!(self.peek(), Some(Token::Pipe)) {
                self.pos += 1;
                // A newline after `|` continues the pipeline.
                self.skip_newlines_for_continuation();
                // `a |` at end of input is a continuation case handled by
                // is_input_complete; here it is a hard error.
                if self.peek().is_none() {
                    return Err(ShellError::Parse(
                        "unexpected end of input after `|`".to_string(),
                    ));
                }
            } else {
                break;
            }
        }
        Ok(pipeline)
    }

    /// Words and redirections until a pipeline/chain boundary.
    fn parse_command(&mut self) -> Result<Command, ShellError> {
        let mut command = Command::default();
        loop {
            match self.peek() {
                Some(Token::Word(_)) => {
                    if let Some(Token::Word(word)) = self.advance() {
                        command.words.push(word);
                    }
                }
                Some(Token::Redirect(_)) => {
                    if let Some(Token::Redirect(op)) = self.advance() {
                        command.redirections.push(self.finish_redirection(op)?);
                    }
                }
                _ => break,
            }
        }
        command.raw_text = command.render();
        Ok(command)
    }

    /// Attach the operand word to operators that need one.
    fn finish_redirection(&mut self, op: RedirOp) -> Result<Redirection, ShellError> {
        match op {
            RedirOp::File { kind } => match self.advance() {
                Some(Token::Word(target)) => Ok(Redirection::File { kind, target }),
                _ => Err(ShellError::Parse(format!(
                    "expected target after `{}`",
                    kind.operator()
                ))),
            },
            RedirOp::HereString => match self.advance() {
                Some(Token::Word(word)) => Ok(Redirection::HereString { word }),
                _ => Err(ShellError::Parse("expected word after `<<<`".to_string())),
            },
            RedirOp::Dup { fd, target } => Ok(Redirection::FdDup { fd, target }),
            RedirOp::HereDoc { delimiter, strip_tabs, content } => {
                Ok(Redirection::HereDoc { delimiter, strip_tabs, content })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RedirKind;

    fn names(chain: &CommandChain) -> Vec<Vec<String>> {
        chain
            .pipelines
            .iter()
            .map(|p| {
                p.commands
                    .iter()
                    .map(|c| c.words[0].flat_text())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_simple_command() {
        let chain = parse("echo hello world").unwrap();
        assert_eq!(chain.pipelines.len(), 1);
        let cmd = &chain.pipelines[0].commands[0];
        assert_eq!(cmd.words.len(), 3);
        assert_eq!(cmd.words[0].flat_text(), "echo");
    }

    #[test]
    fn test_pipeline_split() {
        let chain = parse("echo hi | tr a-z A-Z | wc -c").unwrap();
        assert_eq!(chain.pipelines[0].commands.len(), 3);
    }

    #[test]
    fn test_chain_operators() {
        let chain = parse("true && echo yes || echo no ; echo done").unwrap();
        assert_eq!(chain.pipelines.len(), 4);
        assert_eq!(
            chain.operators,
            vec![ChainOperator::And, ChainOperator::Or, ChainOperator::Seq]
        );
    }

    #[test]
    fn test_newline_is_seq() {
        let chain = parse("echo first\necho second").unwrap();
        assert_eq!(chain.pipelines.len(), 2);
        assert_eq!(chain.operators, vec![ChainOperator::Seq]);
    }

    #[test]
    fn test_consecutive_separators_collapse() {
        let chain = parse("echo a ;; \n\n ; echo b").unwrap();
        assert_eq!(names(&chain), vec![vec!["echo"], vec!["echo"]]);
    }

    #[test]
    fn test_leading_and_is_error() {
        let err = parse("&& echo ok").unwrap_err();
        assert!(err.to_string().contains("&&"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_leading_or_is_error() {
        assert!(parse("|| echo ok").is_err());
    }

    #[test]
    fn test_double_operator_is_error() {
        assert!(parse("echo a && && echo b").is_err());
    }

    #[test]
    fn test_background_flag() {
        let chain = parse("sleep 10 &").unwrap();
        assert!(chain.pipelines[0].background);
    }

    #[test]
    fn test_background_then_more() {
        let chain = parse("sleep 10 & echo next").unwrap();
        assert_eq!(chain.pipelines.len(), 2);
        assert!(chain.pipelines[0].background);
        assert!(!chain.pipelines[1].background);
        assert_eq!(chain.operators, vec![ChainOperator::Seq]);
    }

    #[test]
    fn test_newline_after_andand_continues() {
        let chain = parse("true &&\necho ok").unwrap();
        assert_eq!(chain.pipelines.len(), 2);
        assert_eq!(chain.operators, vec![ChainOperator::And]);
    }

    #[test]
    fn test_redirections_attached() {
        let chain = parse("sort < in.txt > out.txt 2>> err.log").unwrap();
        let cmd = &chain.pipelines[0].commands[0];
        assert_eq!(cmd.redirections.len(), 3);
        assert!(matches!(
            cmd.redirections[0],
            Redirection::File { kind: RedirKind::Input, .. }
        ));
        assert!(matches!(
            cmd.redirections[2],
            Redirection::File { kind: RedirKind::ErrorAppend, .. }
        ));
    }

    #[test]
    fn test_redirect_missing_target() {
        assert!(parse("echo hi >").is_err());
    }

    #[test]
    fn test_heredoc_attached_with_content() {
        let chain = parse("cat <<EOF\nhello\nEOF\n").unwrap();
        let cmd = &chain.pipelines[0].commands[0];
        match &cmd.redirections[0] {
            Redirection::HereDoc { delimiter, content, .. } => {
                assert_eq!(delimiter, "EOF");
                assert_eq!(content, "hello\n");
            }
            other => panic!("expected heredoc, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_pipe_stage_is_error() {
        assert!(parse("echo a | | wc").is_err());
    }

    #[test]
    fn test_pipe_continues_across_newline() {
        let chain = parse("echo hi |\nwc -c").unwrap();
        assert_eq!(chain.pipelines.len(), 1);
        assert_eq!(chain.pipelines[0].commands.len(), 2);
    }

    #[test]
    fn test_pipe_vs_oror() {
        let chain = parse("false || true").unwrap();
        assert_eq!(chain.pipelines.len(), 2);
        assert_eq!(chain.pipelines[0].commands.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let chain = parse("").unwrap();
        assert!(chain.is_empty());
        let chain = parse("  \n # just a comment\n").unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_redirection_only_command() {
        let chain = parse("> empty.txt").unwrap();
        let cmd = &chain.pipelines[0].commands[0];
        assert!(cmd.words.is_empty());
        assert_eq!(cmd.redirections.len(), 1);
    }

    #[test]
    fn test_render_roundtrip_equivalent() {
        for input in [
            "echo hi | tr a-z A-Z",
            "true && echo yes || echo no",
            "sort < in.txt > out.txt",
            "sleep 10 &",
            "cmd 2>&1 | wc -l",
            "echo 'single' \"double\" plain",
        ] {
            let first = parse(input).unwrap();
            let second = parse(&first.render()).unwrap();
            assert_eq!(first, second, "roundtrip mismatch for {:?}", input);
        }
    }

    #[test]
    fn test_is_input_complete() {
        assert!(is_input_complete("echo hi"));
        assert!(is_input_complete("echo hi | wc -l"));
        assert!(!is_input_complete("echo hi |"));
        assert!(!is_input_complete("true &&"));
        assert!(!is_input_complete("echo 'open"));
        assert!(!is_input_complete("echo \"open"));
        assert!(!is_input_complete("cat <<EOF\nbody"));
        assert!(!is_input_complete("echo one \\"));
        // A hard syntax error is "complete": submitting reports it.
        assert!(is_input_complete("&& echo hi"));
    }
}
