use std::time::Duration;

use lessonload_core::{
    HttpError, HttpRequest, HttpResponse, MetricHandle, MetricsRegistry, RunContext, Stage, Tags,
    ThresholdSet, ValueType, VuContext, Workload, group_tags,
};
use serde_json::json;

use crate::fixtures::{Credentials, LessonPool};

pub const PATH_REGISTER: &str = "/instructors/register";
pub const PATH_LOGIN: &str = "/instructors/login";
pub const PATH_LESSONS: &str = "/lessons";

pub const CHECKOUT_DURATION: &str = "checkout_duration";

pub const GROUP_REGISTER: &str = "::Register Instructor";
pub const GROUP_LOGIN: &str = "::Instructor Login (setup)";
pub const GROUP_CREATE_LESSON: &str = "::Performance Test Flow::Create Lesson";

pub const CHECK_REGISTER_STATUS: &str = "Register status 201";
pub const CHECK_LOGIN_STATUS: &str = "login 200";
pub const CHECK_HAS_TOKEN: &str = "has token";
pub const CHECK_LESSON_STATUS: &str = "Lesson status 201";
pub const CHECK_LESSON_TITLE: &str = "Lesson title correct";
pub const CHECK_LESSON_DESCRIPTION: &str = "Lesson description correct";
pub const CHECK_STATUS_TEXT: &str = "status text is 201 Created";

pub const DEFAULT_THINK_TIME: Duration = Duration::from_secs(1);

/// Ramp to 10 VUs over 5s, hold for 10s, ramp down over 5s.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_secs(5), 10),
        Stage::new(Duration::from_secs(10), 10),
        Stage::new(Duration::from_secs(5), 0),
    ]
}

pub fn lesson_thresholds() -> Vec<ThresholdSet> {
    vec![
        ThresholdSet::new("http_req_duration", ["p(95)<2000", "p(99)<3000"]),
        ThresholdSet::new(CHECKOUT_DURATION, ["p(95)<2000", "p(99)<3000"]),
    ]
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("{step} request failed: {source}")]
    Request {
        step: &'static str,
        #[source]
        source: HttpError,
    },

    #[error("{step} returned HTTP {status}")]
    UnexpectedStatus { step: &'static str, status: u16 },

    #[error("login response carried no token")]
    MissingToken,
}

#[derive(Debug, Clone)]
pub struct SetupData {
    pub token: String,
}

/// Feeds the duration of every lesson-creation response into the `checkout_duration` trend.
#[derive(Debug, Clone)]
pub struct CheckoutRecorder {
    trend: MetricHandle,
    tags: Tags,
}

impl CheckoutRecorder {
    pub fn register(registry: &MetricsRegistry, tags: Tags) -> lessonload_core::Result<Self> {
        Ok(Self {
            trend: registry.trend(CHECKOUT_DURATION, ValueType::Time)?,
            tags,
        })
    }

    /// A missing response (transport failure) records nothing.
    pub fn record(&self, response: Option<&HttpResponse>) {
        if let Some(res) = response {
            self.trend.add(res.duration_ms(), &self.tags);
        }
    }
}

/// Registers and logs in one instructor during setup, then creates lessons from every VU.
#[derive(Debug)]
pub struct LessonWorkload {
    base_url: String,
    lessons: LessonPool,
    think_time: Duration,
    recorder: CheckoutRecorder,
}

impl LessonWorkload {
    pub fn new(
        base_url: &str,
        lessons: LessonPool,
        think_time: Duration,
        ctx: &RunContext,
    ) -> lessonload_core::Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            lessons,
            think_time,
            recorder: CheckoutRecorder::register(
                ctx.registry(),
                group_tags(GROUP_CREATE_LESSON),
            )?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn json_post(url: String, body: serde_json::Value) -> HttpRequest {
    HttpRequest::post_owned(url, body.to_string().into())
        .with_header("content-type", "application/json")
}

fn status_of(res: &Result<HttpResponse, HttpError>) -> u16 {
    res.as_ref().map_or(0, |r| r.status)
}

fn json_field(res: &HttpResponse, field: &str) -> Option<String> {
    let body: serde_json::Value = serde_json::from_slice(&res.body).ok()?;
    body.get(field)?.as_str().map(str::to_string)
}

impl Workload for LessonWorkload {
    type Data = SetupData;
    type Error = SetupError;

    async fn setup(&self, ctx: &RunContext) -> Result<SetupData, SetupError> {
        let user = Credentials::generate(None, None);
        tracing::info!(email = %user.email, "registering instructor");

        let tags = group_tags(GROUP_REGISTER);
        let res = ctx
            .http(
                json_post(
                    self.url(PATH_REGISTER),
                    json!({ "name": user.name, "email": user.email, "password": user.password }),
                ),
                &tags,
            )
            .await;
        let status = status_of(&res);
        ctx.check(CHECK_REGISTER_STATUS, status == 201, &tags);
        res.map_err(|source| SetupError::Request {
            step: "register",
            source,
        })?;
        if status != 201 {
            return Err(SetupError::UnexpectedStatus {
                step: "register",
                status,
            });
        }

        let tags = group_tags(GROUP_LOGIN);
        let res = ctx
            .http(
                json_post(
                    self.url(PATH_LOGIN),
                    json!({ "email": user.email, "password": user.password }),
                ),
                &tags,
            )
            .await;
        let status = status_of(&res);
        let token = res
            .as_ref()
            .ok()
            .and_then(|r| json_field(r, "token"))
            .filter(|t| !t.is_empty());
        ctx.check(CHECK_LOGIN_STATUS, status == 200, &tags);
        ctx.check(CHECK_HAS_TOKEN, token.is_some(), &tags);
        res.map_err(|source| SetupError::Request {
            step: "login",
            source,
        })?;
        if status != 200 {
            return Err(SetupError::UnexpectedStatus {
                step: "login",
                status,
            });
        }

        let token = token.ok_or(SetupError::MissingToken)?;
        tracing::info!("instructor logged in");
        Ok(SetupData { token })
    }

    async fn iteration(&self, vu: &mut VuContext, data: &SetupData) {
        let lesson = self.lessons.choose(&mut rand::rng());
        let tags = group_tags(GROUP_CREATE_LESSON);

        let req = json_post(
            self.url(PATH_LESSONS),
            json!({ "title": lesson.title, "description": lesson.description }),
        )
        .with_header("authorization", format!("Bearer {}", data.token));
        let res = vu.run.http(req, &tags).await.ok();
        self.recorder.record(res.as_ref());

        let run = &vu.run;
        let status = res.as_ref().map_or(0, |r| r.status);
        let title = res.as_ref().and_then(|r| json_field(r, "title"));
        let description = res.as_ref().and_then(|r| json_field(r, "description"));
        let status_text = res.as_ref().map(HttpResponse::status_text);

        run.check(CHECK_LESSON_STATUS, status == 201, &tags);
        run.check(
            CHECK_LESSON_TITLE,
            title.as_deref() == Some(lesson.title.as_str()),
            &tags,
        );
        run.check(
            CHECK_LESSON_DESCRIPTION,
            description.as_deref() == Some(lesson.description.as_str()),
            &tags,
        );
        run.check(
            CHECK_STATUS_TEXT,
            status_text.as_deref() == Some("201 Created"),
            &tags,
        );

        if !self.think_time.is_zero() {
            tokio::time::sleep(self.think_time).await;
        }
    }
}
