use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

const PASSWORD: &str = "123456";
const BUNDLED_LESSONS: &str = include_str!("../data/lessons.data.json");
const SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Fresh instructor identity. `vu`/`iteration` are `None` outside a VU (setup), which
    /// leaves the literal `vu`/`iter` placeholders in the email.
    pub fn generate(vu: Option<u64>, iteration: Option<u64>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let suffix = random_suffix(&mut rand::rng());
        let vu = vu.map_or_else(|| "vu".to_string(), |v| v.to_string());
        let iter = iteration.map_or_else(|| "iter".to_string(), |i| i.to_string());

        Self {
            name: format!("UserQA_{now}_{suffix}"),
            email: format!("userqa_{now}_{vu}_{iter}_{suffix}@mail.com"),
            password: PASSWORD.to_string(),
        }
    }
}

fn random_suffix(rng: &mut impl Rng) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonFixture {
    pub title: String,
    pub description: String,
}

/// Read-only lesson fixtures shared by every VU. Never empty.
#[derive(Debug, Clone)]
pub struct LessonPool {
    lessons: Arc<[LessonFixture]>,
}

impl LessonPool {
    /// Parses a JSON array of `{title, description}` objects.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read lessons file: {}", path.display()))?;
        Self::parse(&raw, &path.display().to_string())
    }

    /// The fixture set shipped with the binary, used when no `--lessons` file is given.
    pub fn bundled() -> anyhow::Result<Self> {
        Self::parse(BUNDLED_LESSONS.as_bytes(), "bundled lessons")
    }

    fn parse(raw: &[u8], source: &str) -> anyhow::Result<Self> {
        let lessons: Vec<LessonFixture> = serde_json::from_slice(raw)
            .with_context(|| format!("invalid lessons file: {source}"))?;
        if lessons.is_empty() {
            anyhow::bail!("lessons file is empty: {source}");
        }
        tracing::debug!(count = lessons.len(), source, "lessons loaded");
        Ok(Self {
            lessons: lessons.into(),
        })
    }

    /// `n` synthetic lessons (at least one), for `--generate-lessons`.
    pub fn generated(n: usize) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let mut rng = rand::rng();
        let lessons: Vec<LessonFixture> = (0..n.max(1))
            .map(|i| LessonFixture {
                title: format!("Lesson {now}-{i}"),
                description: format!("Performance test lesson {}", rng.random_range(0..1000)),
            })
            .collect();
        Self {
            lessons: lessons.into(),
        }
    }

    pub fn count(&self) -> usize {
        self.lessons.len()
    }

    /// Uniform pick, with replacement.
    pub fn choose(&self, rng: &mut impl Rng) -> &LessonFixture {
        &self.lessons[rng.random_range(0..self.lessons.len())]
    }
}
