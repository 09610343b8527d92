// src/dag/template.rs

//! Pre-parse token substitution on the raw blueprint text.
//!
//! Known tokens look like `<userVolume>`. Every known token referenced by the
//! definition must resolve from the [`TemplateContext`]; anything else in
//! angle brackets is left as-is.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::dag::DefinitionError;
use crate::model::{Judgement, Problem, Submission};

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z][A-Za-z0-9]*)>").expect("token pattern is a valid regex")
});

/// The substitutable placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Token {
    UserVolume,
    PublicVolume,
    PrivateVolume,
    ProblemId,
    SubmissionId,
    AccountId,
}

impl Token {
    pub const ALL: [Token; 6] = [
        Token::UserVolume,
        Token::PublicVolume,
        Token::PrivateVolume,
        Token::ProblemId,
        Token::SubmissionId,
        Token::AccountId,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Token::UserVolume => "userVolume",
            Token::PublicVolume => "publicVolume",
            Token::PrivateVolume => "privateVolume",
            Token::ProblemId => "problemId",
            Token::SubmissionId => "submissionId",
            Token::AccountId => "accountId",
        }
    }

    pub fn from_name(name: &str) -> Option<Token> {
        Token::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// Values available for substitution in one judgement.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: BTreeMap<Token, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, token: Token, value: impl Into<String>) -> &mut Self {
        self.values.insert(token, value.into());
        self
    }

    pub fn get(&self, token: Token) -> Option<&str> {
        self.values.get(&token).map(String::as_str)
    }

    /// Collect what a judgement's submission and problem provide.
    pub fn for_judgement(
        judgement: &Judgement,
        submission: Option<&Submission>,
        problem: Option<&Problem>,
    ) -> Self {
        let mut ctx = Self::new();

        if let Some(s) = submission {
            ctx.set(Token::SubmissionId, s.id.to_string());
            ctx.set(Token::AccountId, s.submitter_id.to_string());
            if !s.user_volume.is_empty() {
                ctx.set(Token::UserVolume, s.user_volume.clone());
            }
        } else if let Some(id) = judgement.arg_id("account") {
            ctx.set(Token::AccountId, id.to_string());
        }

        if let Some(p) = problem {
            ctx.set(Token::ProblemId, p.id.to_string());
            if !p.public_volume.is_empty() {
                ctx.set(Token::PublicVolume, p.public_volume.clone());
            }
            if !p.private_volume.is_empty() {
                ctx.set(Token::PrivateVolume, p.private_volume.clone());
            }
        }

        // Arguments named after a token fill whatever is still missing.
        for token in Token::ALL {
            if ctx.get(token).is_none() {
                if let Some(value) = judgement.args.get(token.name()) {
                    ctx.set(token, value.clone());
                }
            }
        }

        ctx
    }
}

/// Replace every known token in `text`.
///
/// Values are JSON-string escaped, since tokens normally sit inside string
/// literals of the definition.
pub fn substitute(text: &str, ctx: &TemplateContext) -> Result<String, DefinitionError> {
    let mut unresolved: Vec<&'static str> = Vec::new();
    for caps in TOKEN_RE.captures_iter(text) {
        if let Some(token) = Token::from_name(&caps[1]) {
            if ctx.get(token).is_none() && !unresolved.contains(&token.name()) {
                unresolved.push(token.name());
            }
        }
    }
    if !unresolved.is_empty() {
        return Err(DefinitionError::UnresolvedToken(unresolved.join(", ")));
    }

    let out = TOKEN_RE.replace_all(text, |caps: &Captures<'_>| {
        match Token::from_name(&caps[1]).and_then(|t| ctx.get(t)) {
            Some(value) => escape_json_fragment(value),
            None => caps[0].to_string(),
        }
    });

    debug!(tokens = ctx.values.len(), "blueprint tokens substituted");
    Ok(out.into_owned())
}

fn escape_json_fragment(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
