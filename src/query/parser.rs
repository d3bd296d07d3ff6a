use crate::record::RecordType;

/// Parsed query representation
#[derive(Debug, Clone)]
pub struct Query {
    pub root: QueryNode,
}

/// Query AST node
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Single term, matched against document tokens
    Term(String),
    /// Exact phrase search (quoted), matched against document text
    Phrase(String),
    /// Boolean AND (all must match)
    And(Vec<QueryNode>),
    /// Boolean OR (any can match)
    Or(Vec<QueryNode>),
    /// Boolean NOT (exclude matches)
    Not(Box<QueryNode>),
    /// `model:<type>[,<type>...]`: documents of any listed record type
    Model(Vec<RecordType>),
    /// `*`: every document
    MatchAll,
    /// Nothing to match on; behaves like MatchAll at the top level
    Empty,
}

impl Query {
    /// True when the query places no restriction on documents
    pub fn matches_everything(&self) -> bool {
        matches!(self.root, QueryNode::Empty | QueryNode::MatchAll)
    }
}

/// Parse a query string into a Query structure
pub fn parse_query(input: &str) -> Query {
    let mut parser = QueryParser::new(input);
    parser.parse()
}

/// Query parser
struct QueryParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> QueryParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(&mut self) -> Query {
        let mut root = self.parse_or();

        // Unbalanced ')' stops parse_or early; keep going so no input is dropped
        while !self.is_eof() {
            self.advance();
            let rest = self.parse_or();
            root = join_and(root, rest);
        }

        Query { root }
    }

    fn parse_or(&mut self) -> QueryNode {
        let mut nodes = vec![self.parse_and()];

        self.skip_whitespace();
        while self.consume_char('|') {
            self.skip_whitespace();
            nodes.push(self.parse_and());
            self.skip_whitespace();
        }

        nodes.retain(|n| *n != QueryNode::Empty);
        match nodes.len() {
            0 => QueryNode::Empty,
            1 => nodes.swap_remove(0),
            _ => QueryNode::Or(nodes),
        }
    }

    fn parse_and(&mut self) -> QueryNode {
        let mut nodes = Vec::new();

        loop {
            self.skip_whitespace();

            if self.is_eof() || self.peek_char() == Some(')') || self.peek_char() == Some('|') {
                break;
            }

            let node = self.parse_unary();
            if node != QueryNode::Empty {
                nodes.push(node);
            }
        }

        match nodes.len() {
            0 => QueryNode::Empty,
            1 => nodes.swap_remove(0),
            _ => QueryNode::And(nodes),
        }
    }

    fn parse_unary(&mut self) -> QueryNode {
        self.skip_whitespace();

        if self.consume_char('-') {
            return match self.parse_primary() {
                QueryNode::Empty => QueryNode::Empty,
                inner => QueryNode::Not(Box::new(inner)),
            };
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> QueryNode {
        self.skip_whitespace();

        // Parenthesized expression
        if self.consume_char('(') {
            let node = self.parse_or();
            self.consume_char(')');
            return node;
        }

        // Quoted phrase
        if self.peek_char() == Some('"') {
            return self.parse_phrase();
        }

        // Field filter or term
        self.parse_term()
    }

    fn parse_phrase(&mut self) -> QueryNode {
        self.consume_char('"');
        let start = self.pos;

        while !self.is_eof() && self.peek_char() != Some('"') {
            self.advance();
        }

        let phrase = self.input[start..self.pos].trim().to_string();
        self.consume_char('"');

        if phrase.is_empty() {
            QueryNode::Empty
        } else {
            QueryNode::Phrase(phrase)
        }
    }

    fn parse_term(&mut self) -> QueryNode {
        let start = self.pos;

        // Check for field prefix
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == ':' {
                self.advance();
                if ch == ':' {
                    let field = &self.input[start..self.pos - 1];
                    if !field.is_empty() {
                        return self.parse_field(field);
                    }
                }
            } else {
                break;
            }
        }

        // Consume the rest of the word
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || ch == '|' || ch == ')' || ch == '(' || ch == '"' {
                break;
            }
            self.advance();
        }

        let word = &self.input[start..self.pos];
        match word {
            "" => {
                // Stray special character; skip it
                self.advance();
                QueryNode::Empty
            }
            "*" => QueryNode::MatchAll,
            _ => QueryNode::Term(word.to_string()),
        }
    }

    fn parse_field(&mut self, field: &str) -> QueryNode {
        let field_start = self.pos - field.len() - 1;
        let value_start = self.pos;

        // Read value until whitespace or special char
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || ch == '|' || ch == ')' {
                break;
            }
            self.advance();
        }

        let value = &self.input[value_start..self.pos];

        match field.to_lowercase().as_str() {
            "model" | "models" => {
                let mut types: Vec<RecordType> = Vec::new();
                for name in value.split(',').filter(|n| !n.is_empty()) {
                    let record_type = RecordType::from(name);
                    if !types.contains(&record_type) {
                        types.push(record_type);
                    }
                }
                if types.is_empty() {
                    QueryNode::Empty
                } else {
                    QueryNode::Model(types)
                }
            }
            // Unknown field: search for the text as written
            _ => QueryNode::Term(self.input[field_start..self.pos].to_string()),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.pos += ch.len_utf8();
        }
    }
}

fn join_and(left: QueryNode, right: QueryNode) -> QueryNode {
    match (left, right) {
        (QueryNode::Empty, node) | (node, QueryNode::Empty) => node,
        (QueryNode::And(mut nodes), QueryNode::And(more)) => {
            nodes.extend(more);
            QueryNode::And(nodes)
        }
        (QueryNode::And(mut nodes), node) => {
            nodes.push(node);
            QueryNode::And(nodes)
        }
        (left, right) => QueryNode::And(vec![left, right]),
    }
}
