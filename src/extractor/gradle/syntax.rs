//! Lenient reader for Gradle build scripts (Groovy and Kotlin DSL).
//!
//! Produces a tree of nested call expressions. Nothing here evaluates the
//! script; anything the reader does not understand becomes [`Node::Opaque`]
//! so the scanner can skip it.

/// One node of the call-expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// `name(args) { closure }` or `name arg, arg`. The closure, if any, is
    /// the last argument as a [`Node::Block`].
    Call { name: String, args: Vec<Node> },
    /// String, number or boolean literal, and named-argument keys.
    Constant(String),
    /// Bare reference to a variable or property.
    Identifier(String),
    /// Closure body or list literal.
    Block(Vec<Node>),
    /// An expression the reader does not model (assignments, interpolated
    /// strings, operators).
    Opaque(String),
}

/// Nesting beyond this is skipped and read as [`Node::Opaque`].
const MAX_DEPTH: usize = 256;

/// Parse a whole script into its top-level statements.
pub fn parse(source: &str) -> Vec<Node> {
    let tokens = tokenize(source);
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.parse_statements(false)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    /// A double-quoted string containing `$` interpolation.
    GString(String),
    Number(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Newline,
    Semi,
    /// Any other punctuation (`=`, `+`, `->`, `.` outside names, ...).
    Other(char),
}

fn tokenize(source: &str) -> Vec<Token> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                tokens.push(Token::Newline);
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            '\'' | '"' => {
                let (text, next) = read_string(&chars, i);
                if c == '"' && text.contains('$') {
                    tokens.push(Token::GString(text));
                } else {
                    tokens.push(Token::Str(text));
                }
                i = next;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semi);
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len() {
                    let ch = chars[i];
                    let dotted = ch == '.'
                        && chars
                            .get(i + 1)
                            .is_some_and(|n| n.is_alphabetic() || *n == '_');
                    if ch.is_alphanumeric() || ch == '_' || ch == '$' || dotted {
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                tokens.push(Token::Other(other));
                i += 1;
            }
        }
    }

    tokens
}

/// Read a quoted string starting at `start`; returns its text and the index
/// after the closing quote. Unterminated strings run to end of input.
fn read_string(chars: &[char], start: usize) -> (String, usize) {
    let quote = chars[start];
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let mut i = if triple { start + 3 } else { start + 1 };
    let mut text = String::new();

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            if let Some(&escaped) = chars.get(i + 1) {
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            i += 2;
            continue;
        }
        if triple {
            if c == quote && chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                return (text, i + 3);
            }
        } else if c == quote {
            return (text, i + 1);
        } else if c == '\n' {
            // Single-line string left open; stop at the line end.
            return (text, i);
        }
        text.push(c);
        i += 1;
    }

    (text, i)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Recursive-descent reader over the token stream.
///
/// ```text
/// statements := ( statement ( NEWLINE | ";" )* )*
/// statement  := call | expr
/// call       := NAME "(" args ")" closure? | NAME closure | NAME command_args
/// command_args := arg ( "," NEWLINE* arg )*
/// arg        := NAME ":" expr | expr
/// expr       := STRING | NUMBER | list | closure | call | NAME
/// ```
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Current nesting of blocks, argument lists and expressions.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn consume(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline | Token::Semi)) {
            self.pos += 1;
        }
    }

    /// Statements until end of input, or until the closing `}` when
    /// `in_block` is set (the brace itself is consumed).
    fn parse_statements(&mut self, in_block: bool) -> Vec<Node> {
        if in_block && self.depth >= MAX_DEPTH {
            return vec![self.skip_nested()];
        }
        self.depth += 1;
        let mut nodes = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => break,
                Some(Token::RBrace) => {
                    self.consume();
                    if in_block {
                        break;
                    }
                }
                Some(_) => {
                    let start = self.pos;
                    let node = self.parse_statement();
                    nodes.push(node);
                    if self.pos == start {
                        // Always make progress on unexpected tokens.
                        self.consume();
                    }
                }
            }
        }
        self.depth -= 1;
        nodes
    }

    fn parse_statement(&mut self) -> Node {
        let node = self.parse_expr();
        if self.at_statement_end() {
            return node;
        }
        // Trailing operators or assignments: swallow the rest of the line.
        let mut text = describe(&node);
        while !self.at_statement_end() {
            match self.peek() {
                Some(Token::LBrace) => {
                    self.consume();
                    self.parse_statements(true);
                }
                Some(Token::LParen) | Some(Token::LBracket) => {
                    self.skip_balanced();
                }
                _ => {
                    if let Some(t) = self.consume() {
                        text.push_str(&token_text(&t));
                    }
                }
            }
        }
        Node::Opaque(text)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::Newline | Token::Semi | Token::RBrace)
        )
    }

    fn parse_expr(&mut self) -> Node {
        if self.depth >= MAX_DEPTH {
            return self.skip_expr();
        }
        self.depth += 1;
        let node = self.parse_expr_inner();
        self.depth -= 1;
        node
    }

    fn parse_expr_inner(&mut self) -> Node {
        match self.peek().cloned() {
            Some(Token::Str(s)) => {
                self.consume();
                Node::Constant(s)
            }
            Some(Token::Number(n)) => {
                self.consume();
                Node::Constant(n)
            }
            Some(Token::GString(s)) => {
                self.consume();
                Node::Opaque(s)
            }
            Some(Token::LBracket) => {
                self.consume();
                Node::Block(self.parse_list())
            }
            Some(Token::LBrace) => {
                self.consume();
                Node::Block(self.parse_statements(true))
            }
            Some(Token::LParen) => {
                self.consume();
                let inner = self.parse_args(Token::RParen);
                Node::Block(inner)
            }
            Some(Token::Ident(name)) => {
                self.consume();
                self.parse_after_name(name)
            }
            Some(t) => {
                self.consume();
                Node::Opaque(token_text(&t))
            }
            None => Node::Opaque(String::new()),
        }
    }

    /// Decide what a bare name turns into based on what follows it.
    fn parse_after_name(&mut self, name: String) -> Node {
        let method = last_segment(&name);
        match self.peek() {
            Some(Token::LParen) => {
                self.consume();
                let mut args = self.parse_args(Token::RParen);
                if matches!(self.peek(), Some(Token::LBrace)) {
                    self.consume();
                    args.push(Node::Block(self.parse_statements(true)));
                }
                Node::Call { name: method, args }
            }
            Some(Token::LBrace) => {
                self.consume();
                let body = self.parse_statements(true);
                Node::Call {
                    name: method,
                    args: vec![Node::Block(body)],
                }
            }
            _ if name == "true" || name == "false" || name == "null" => Node::Constant(name),
            _ if self.starts_command_arg() => {
                let args = self.parse_command_args();
                Node::Call { name: method, args }
            }
            _ => Node::Identifier(name),
        }
    }

    /// Whether the next token can begin a paren-less command argument.
    fn starts_command_arg(&self) -> bool {
        match self.peek() {
            Some(Token::Str(_) | Token::GString(_) | Token::Number(_) | Token::LBracket) => true,
            Some(Token::Ident(_)) => !matches!(self.peek_at(1), Some(Token::Other('='))),
            _ => false,
        }
    }

    fn parse_command_args(&mut self) -> Vec<Node> {
        let mut args = Vec::new();
        loop {
            self.parse_arg(&mut args, false);
            if matches!(self.peek(), Some(Token::Comma)) {
                self.consume();
                while matches!(self.peek(), Some(Token::Newline)) {
                    self.consume();
                }
                continue;
            }
            break;
        }
        if matches!(self.peek(), Some(Token::LBrace)) {
            self.consume();
            args.push(Node::Block(self.parse_statements(true)));
        }
        args
    }

    /// Comma-separated arguments up to and including `close`.
    fn parse_args(&mut self, close: Token) -> Vec<Node> {
        if self.depth >= MAX_DEPTH {
            return vec![self.skip_nested()];
        }
        self.depth += 1;
        let mut args = Vec::new();
        loop {
            while matches!(self.peek(), Some(Token::Newline | Token::Comma)) {
                self.consume();
            }
            match self.peek() {
                None => break,
                Some(t) if *t == close => {
                    self.consume();
                    break;
                }
                Some(Token::RBrace) => break,
                Some(_) => {
                    let start = self.pos;
                    self.parse_arg(&mut args, true);
                    // Skip operator tails such as `"a" + b` up to the next separator.
                    while !matches!(
                        self.peek(),
                        None | Some(Token::Comma | Token::Newline | Token::RBrace)
                    ) && self.peek() != Some(&close)
                    {
                        self.consume();
                    }
                    if self.pos == start {
                        self.consume();
                    }
                }
            }
        }
        self.depth -= 1;
        args
    }

    fn parse_list(&mut self) -> Vec<Node> {
        self.parse_args(Token::RBracket)
    }

    /// One argument; named arguments push their key as a constant first.
    ///
    /// `kotlin_named` also accepts Kotlin's `name = value` form, which is only
    /// unambiguous inside parentheses.
    fn parse_arg(&mut self, args: &mut Vec<Node>, kotlin_named: bool) {
        if let Some(key) = self.named_key(kotlin_named) {
            self.pos += 2;
            args.push(Node::Constant(key));
        }
        args.push(self.parse_expr());
    }

    /// The key of a `key: value` (or Kotlin `key = value`) argument at the
    /// cursor, without consuming anything.
    fn named_key(&self, kotlin_named: bool) -> Option<String> {
        let key = match self.peek() {
            Some(Token::Ident(k) | Token::Str(k)) => k.clone(),
            _ => return None,
        };
        match self.peek_at(1) {
            Some(Token::Colon) => Some(key),
            Some(Token::Other('='))
                if kotlin_named && self.peek_at(2) != Some(&Token::Other('=')) =>
            {
                Some(key)
            }
            _ => None,
        }
    }

    /// Skip past the bracket closing an already consumed opener.
    fn skip_nested(&mut self) -> Node {
        let mut depth = 1usize;
        while let Some(t) = self.consume() {
            match t {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        Node::Opaque("...".to_string())
    }

    /// Skip one expression without descending into it.
    fn skip_expr(&mut self) -> Node {
        match self.peek() {
            Some(Token::LParen | Token::LBracket | Token::LBrace) => {
                self.skip_balanced();
                Node::Opaque("...".to_string())
            }
            Some(_) => {
                let text = self.consume().map(|t| token_text(&t)).unwrap_or_default();
                Node::Opaque(text)
            }
            None => Node::Opaque(String::new()),
        }
    }

    fn skip_balanced(&mut self) {
        let mut depth = 0usize;
        while let Some(t) = self.consume() {
            match t {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }
}

fn last_segment(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_string()
}

fn describe(node: &Node) -> String {
    match node {
        Node::Call { name, .. } => name.clone(),
        Node::Constant(s) | Node::Identifier(s) | Node::Opaque(s) => s.clone(),
        Node::Block(_) => "{}".to_string(),
    }
}

fn token_text(token: &Token) -> String {
    match token {
        Token::Ident(s) | Token::Str(s) | Token::GString(s) | Token::Number(s) => s.clone(),
        Token::LParen => "(".into(),
        Token::RParen => ")".into(),
        Token::LBrace => "{".into(),
        Token::RBrace => "}".into(),
        Token::LBracket => "[".into(),
        Token::RBracket => "]".into(),
        Token::Comma => ",".into(),
        Token::Colon => ":".into(),
        Token::Newline => "\n".into(),
        Token::Semi => ";".into(),
        Token::Other(c) => c.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Node>) -> Node {
        Node::Call {
            name: name.to_string(),
            args,
        }
    }

    fn constant(s: &str) -> Node {
        Node::Constant(s.to_string())
    }

    #[test]
    fn test_command_call_with_string() {
        let nodes = parse("implementation 'com.google.guava:guava:31.1-jre'\n");
        assert_eq!(
            nodes,
            vec![call(
                "implementation",
                vec![constant("com.google.guava:guava:31.1-jre")]
            )]
        );
    }

    #[test]
    fn test_block_call() {
        let nodes = parse("dependencies {\n  api(\"a:b:1\")\n}\n");
        assert_eq!(
            nodes,
            vec![call(
                "dependencies",
                vec![Node::Block(vec![call("api", vec![constant("a:b:1")])])]
            )]
        );
    }

    #[test]
    fn test_named_arguments_become_key_value_constants() {
        let nodes = parse("testCompile group: 'junit', name: 'junit', version: '4.12'");
        assert_eq!(
            nodes,
            vec![call(
                "testCompile",
                vec![
                    constant("group"),
                    constant("junit"),
                    constant("name"),
                    constant("junit"),
                    constant("version"),
                    constant("4.12"),
                ]
            )]
        );
    }

    #[test]
    fn test_named_arguments_across_lines() {
        let nodes = parse("compile group: 'g',\n    name: 'a',\n    version: '1'\n");
        match &nodes[0] {
            Node::Call { name, args } => {
                assert_eq!(name, "compile");
                assert_eq!(args.len(), 6);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_parens_with_trailing_closure() {
        let nodes = parse("compile('a:b:1') {\n  transitive = false\n}\n");
        match &nodes[0] {
            Node::Call { name, args } => {
                assert_eq!(name, "compile");
                assert_eq!(args[0], constant("a:b:1"));
                assert!(matches!(args[1], Node::Block(_)));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_comments_and_assignments() {
        let src = r#"
// a comment with dependencies { }
/* block
   comment */
version = '1.0'
sourceCompatibility = 1.8
"#;
        let nodes = parse(src);
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| matches!(n, Node::Opaque(_))));
    }

    #[test]
    fn test_interpolated_string_is_opaque() {
        let nodes = parse("implementation \"org.x:lib:$libVersion\"");
        assert_eq!(
            nodes,
            vec![call(
                "implementation",
                vec![Node::Opaque("org.x:lib:$libVersion".to_string())]
            )]
        );
    }

    #[test]
    fn test_dotted_name_uses_last_segment() {
        let nodes = parse("project.dependencies {\n}\n");
        assert_eq!(nodes, vec![call("dependencies", vec![Node::Block(vec![])])]);
    }

    #[test]
    fn test_list_literal_flattens_to_block() {
        let nodes = parse("compile(['a:b:1', 'c:d:2'])");
        assert_eq!(
            nodes,
            vec![call(
                "compile",
                vec![Node::Block(vec![constant("a:b:1"), constant("c:d:2")])]
            )]
        );
    }

    #[test]
    fn test_nested_call_argument() {
        let nodes = parse("implementation files('libs/a.jar')");
        assert_eq!(
            nodes,
            vec![call(
                "implementation",
                vec![call("files", vec![constant("libs/a.jar")])]
            )]
        );
    }

    #[test]
    fn test_boolean_literals_are_constants() {
        let nodes = parse("compile group: 'g', name: 'a', version: '1', transitive: false");
        match &nodes[0] {
            Node::Call { args, .. } => assert_eq!(args.last(), Some(&constant("false"))),
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_kotlin_named_arguments() {
        let nodes = parse("implementation(group = \"g\", name = \"a\", version = \"1\")");
        assert_eq!(
            nodes,
            vec![call(
                "implementation",
                vec![
                    constant("group"),
                    constant("g"),
                    constant("name"),
                    constant("a"),
                    constant("version"),
                    constant("1"),
                ]
            )]
        );
    }

    #[test]
    fn test_deep_nesting_is_capped() {
        let lists = format!("x({}'g:a:1'{})", "[".repeat(50_000), "]".repeat(50_000));
        assert_eq!(parse(&lists).len(), 1);

        let closures = format!("{}{}", "a {\n".repeat(50_000), "}\n".repeat(50_000));
        assert_eq!(parse(&closures).len(), 1);

        let assignments = "v = { ".repeat(50_000);
        assert!(!parse(&assignments).is_empty());

        let commands = "a ".repeat(50_000);
        assert_eq!(parse(&commands).len(), 1);
    }

    #[test]
    fn test_nesting_below_cap_is_kept() {
        let src = format!(
            "{}dependencies {{ implementation 'g:a:1' }}{}",
            "a {\n".repeat(20),
            "}\n".repeat(20)
        );
        let mut node = &parse(&src)[0];
        for _ in 0..20 {
            let Node::Call { args, .. } = node else { panic!("expected call") };
            let Node::Block(body) = &args[0] else { panic!("expected block") };
            node = &body[0];
        }
        assert!(matches!(node, Node::Call { name, .. } if name == "dependencies"));
    }

    #[test]
    fn test_unbalanced_input_does_not_hang() {
        let nodes = parse("dependencies {\n  implementation 'a:b:1'\n");
        assert_eq!(nodes.len(), 1);
        let nodes = parse(")))}}} ,,, 'x");
        assert!(!nodes.is_empty());
    }
}
