#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Integer(i64),

    // Delimiters
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    Comma,     // ,
    Semicolon, // ;

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Equal,

    // Keywords
    Let,
    Var,
    Fn,
    If,
    Else,
    While,
    Return,
    Print,

    // Identifier (variable or function name)
    Ident(std::string::String),

    Eof,
}

impl Token {
    /// Maps a scanned word to its keyword token, if it is one.
    pub fn keyword(word: &str) -> Option<Token> {
        Some(match word {
            "let" => Token::Let,
            "var" => Token::Var,
            "fn" => Token::Fn,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "return" => Token::Return,
            "print" => Token::Print,
            _ => return None,
        })
    }

    /// Short description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            Token::Integer(n) => format!("integer '{}'", n),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Eof => "end of input".to_string(),
            other => format!("'{}'", other.lexeme()),
        }
    }

    fn lexeme(&self) -> &'static str {
        match self {
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Equal => "=",
            Token::Let => "let",
            Token::Var => "var",
            Token::Fn => "fn",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::Return => "return",
            Token::Print => "print",
            Token::Integer(_) | Token::Ident(_) | Token::Eof => "",
        }
    }
}
