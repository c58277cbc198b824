// Line splitter for the assembly dialect. Positions are byte offsets into the
// normalized (upper-cased) line so errors can be underlined in the editor.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InstructionTokens<'a> {
    pub name: Token<'a>,
    pub arg1: Option<Token<'a>>,
    pub arg2: Option<Token<'a>>,
    /// Anything after the second operand. Always an error.
    pub excess: Option<Token<'a>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourceLine<'a> {
    pub label: Option<Token<'a>>,
    pub instruction: Option<InstructionTokens<'a>>,
}

/// Everything from the first `#` on is dropped.
pub fn strip_comment(line: &str) -> &str {
    match line.split('#').next() {
        Some(part) => part,
        None => line,
    }
}

/// Split one normalized line into its optional label and instruction parts.
///
/// A label is the text before the first `:`; it must be a single token. The
/// offending text is returned as the error when it is not.
pub fn split_line(line: &str) -> Result<SourceLine<'_>, Token<'_>> {
    let content = strip_comment(line);
    let mut cursor = Cursor::new(content);
    cursor.skip_whitespace();

    let mut label = None;
    if let Some(colon) = content.find(':') {
        if colon > cursor.position {
            let name = cursor.token_until(colon);
            if let Some(name) = name {
                if name.text.contains(char::is_whitespace) {
                    return Err(name);
                }
                label = Some(name);
            }
            cursor.position = colon.saturating_add(1);
        }
    }

    cursor.skip_whitespace();
    let Some(name) = cursor.take_while(|ch| !ch.is_whitespace()) else {
        return Ok(SourceLine {
            label,
            instruction: None,
        });
    };
    cursor.skip_whitespace();
    let arg1 = cursor.take_while(is_argument_char);
    cursor.skip_whitespace();
    cursor.eat(',');
    cursor.skip_whitespace();
    let arg2 = cursor.take_while(is_argument_char);
    cursor.skip_whitespace();
    let excess = cursor.rest();

    Ok(SourceLine {
        label,
        instruction: Some(InstructionTokens {
            name,
            arg1,
            arg2,
            excess,
        }),
    })
}

fn is_argument_char(ch: char) -> bool {
    ch != ',' && !ch.is_whitespace()
}

struct Cursor<'a> {
    line: &'a str,
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Self { line, position: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.line.get(self.position..).and_then(|rest| rest.chars().next())
    }

    fn bump(&mut self, ch: char) {
        self.position = self.position.saturating_add(ch.len_utf8());
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.bump(ch);
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump(expected);
            return true;
        }
        false
    }

    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> Option<Token<'a>> {
        let start = self.position;
        while let Some(ch) = self.peek() {
            if !accept(ch) {
                break;
            }
            self.bump(ch);
        }
        self.token(start, self.position)
    }

    /// Token from the cursor to `end`, with trailing whitespace trimmed.
    fn token_until(&self, end: usize) -> Option<Token<'a>> {
        let text = self.line.get(self.position..end)?.trim_end();
        let end = self.position.saturating_add(text.len());
        self.token(self.position, end)
    }

    fn rest(&mut self) -> Option<Token<'a>> {
        let start = self.position;
        let text = self.line.get(start..)?.trim_end();
        let end = start.saturating_add(text.len());
        self.position = end;
        self.token(start, end)
    }

    fn token(&self, start: usize, end: usize) -> Option<Token<'a>> {
        if start >= end {
            return None;
        }
        let text = self.line.get(start..end)?;
        Some(Token { text, start, end })
    }
}
