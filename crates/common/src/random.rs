//! Synthetic test data
//!
//! Every generated email carries 48 bits taken from a random UUID, so two
//! calls never hand out the same address in practice, even across parallel
//! workers or runs seeded with the same value.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::dates;
use crate::types::{NewArticle, NewUser};

/// Passwords used when registering users
pub mod passwords {
    /// Accepted by the registration form and the API
    pub const VALID: &str = "password123";

    /// Too weak for a real system; the application still accepts it
    pub const WEAK: &str = "1";
}

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Barbara", "Brian", "Claude", "Dennis", "Donald", "Edsger", "Frances", "Grace",
    "Hedy", "Ivan", "John", "Ken", "Leslie", "Linus", "Margaret", "Niklaus", "Radia", "Shafi",
    "Sophie", "Tim", "Yukihiro", "Zuse",
];

const LAST_NAMES: &[&str] = &[
    "Allen", "Backus", "Berners-Lee", "Cerf", "Dijkstra", "Engelbart", "Goldwasser", "Hamilton",
    "Hopper", "Kay", "Knuth", "Lamport", "Liskov", "Lovelace", "McCarthy", "Perlman", "Ritchie",
    "Stroustrup", "Sutherland", "Thompson", "Torvalds", "Turing", "Wilson", "Wirth",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net", "test.dev"];

const WORDS: &[&str] = &[
    "agile", "async", "binary", "cache", "compile", "debug", "deploy", "fixture", "graph",
    "kernel", "latency", "module", "network", "pipeline", "query", "refactor", "runtime",
    "schema", "socket", "stack", "thread", "token", "vector", "widget",
];

/// Generated identity, without a password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub avatar: String,
}

impl UserData {
    /// Registration body with the given password
    pub fn with_password(self, password: &str) -> NewUser {
        NewUser {
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            password: password.to_string(),
            avatar: Some(self.avatar),
        }
    }
}

/// Random data provider
pub struct RandomData {
    rng: StdRng,
}

impl RandomData {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence of names, dates and articles
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn pick(&mut self, from: &[&str]) -> String {
        from.choose(&mut self.rng).copied().unwrap_or_default().to_string()
    }

    pub fn first_name(&mut self) -> String {
        self.pick(FIRST_NAMES)
    }

    pub fn last_name(&mut self) -> String {
        self.pick(LAST_NAMES)
    }

    /// Unique email address
    pub fn email(&mut self) -> String {
        let first = self.first_name();
        let last = self.last_name();
        self.email_for(&first, &last)
    }

    fn email_for(&mut self, first: &str, last: &str) -> String {
        let unique = uuid::Uuid::new_v4().simple().to_string();
        let domain = self.pick(EMAIL_DOMAINS);
        format!(
            "{}.{}.{}@{}",
            first.to_ascii_lowercase(),
            last.to_ascii_lowercase().replace('-', ""),
            &unique[..12],
            domain
        )
    }

    /// Birth date between 1970 and 2005, as `YYYY-MM-DD`
    pub fn birth_date(&mut self) -> String {
        dates::random_birth_date(&mut self.rng)
    }

    /// Avatar path in the format the application stores
    pub fn avatar(&mut self) -> String {
        let n: u32 = self.rng.gen_range(1..=9);
        format!(".\\data\\users\\face_{}.png", n)
    }

    pub fn user(&mut self) -> UserData {
        let first_name = self.first_name();
        let last_name = self.last_name();
        let email = self.email_for(&first_name, &last_name);
        UserData {
            first_name,
            last_name,
            email,
            avatar: self.avatar(),
        }
    }

    /// Registration body with the standard valid password
    pub fn new_user(&mut self) -> NewUser {
        self.user().with_password(passwords::VALID)
    }

    fn sentence(&mut self, words: usize) -> String {
        let mut out: Vec<String> = (0..words).map(|_| self.pick(WORDS)).collect();
        if let Some(first) = out.first_mut() {
            let capitalized: String = first
                .chars()
                .take(1)
                .flat_map(char::to_uppercase)
                .chain(first.chars().skip(1))
                .collect();
            *first = capitalized;
        }
        out.join(" ")
    }

    pub fn article(&mut self) -> NewArticle {
        let title_len = self.rng.gen_range(3..=6);
        let body_len = self.rng.gen_range(12..=30);
        let image_n: u32 = self.rng.gen_range(1..=20);
        NewArticle {
            title: self.sentence(title_len),
            body: format!("{}.", self.sentence(body_len)),
            date: dates::random_timestamp(&mut self.rng),
            image: format!(".\\data\\images\\256\\article_{}.jpg", image_n),
        }
    }
}

impl Default for RandomData {
    fn default() -> Self {
        Self::new()
    }
}
