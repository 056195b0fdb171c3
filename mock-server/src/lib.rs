use std::{collections::BTreeSet, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSet {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Competence {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataSets {
    pub default: String,
    pub datasets: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetierScore {
    pub metier: String,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetierSuggestions {
    pub scores: Vec<MetierScore>,
}

#[derive(Deserialize)]
pub struct MetierQuery {
    pub dataset: DataSet,
    pub competences: Vec<Competence>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobScore {
    pub job: JobRef,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobGraph {
    pub edges: Vec<(String, String)>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobRecommendation {
    pub scores: Vec<JobScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<JobGraph>,
}

struct Metier {
    name: &'static str,
    competences: &'static [&'static str],
}

struct Job {
    id: &'static str,
    name: &'static str,
    skills: &'static [&'static str],
}

struct Experience {
    id: &'static str,
    skills: &'static [&'static str],
}

/// Read-only fixture data served by the mock backend.
pub struct Catalog {
    default_data_set: &'static str,
    data_sets: Vec<(&'static str, Vec<Metier>)>,
    jobs: Vec<Job>,
    experiences: Vec<Experience>,
}

impl Catalog {
    pub fn fixture() -> Self {
        Self {
            default_data_set: "2023",
            data_sets: vec![
                (
                    "2023",
                    vec![
                        Metier {
                            name: "Développeur",
                            competences: &["Rust", "SQL", "Git"],
                        },
                        Metier {
                            name: "Administrateur système",
                            competences: &["Linux", "Réseau", "Git"],
                        },
                    ],
                ),
                (
                    "2024",
                    vec![Metier {
                        name: "Analyste de données",
                        competences: &["SQL", "Statistiques"],
                    }],
                ),
            ],
            jobs: vec![
                Job {
                    id: "j1",
                    name: "Développeur backend",
                    skills: &["s-rust", "s-sql"],
                },
                Job {
                    id: "j2",
                    name: "Analyste",
                    skills: &["s-sql", "s-stats"],
                },
                Job {
                    id: "j3",
                    name: "Technicien réseau",
                    skills: &["s-net"],
                },
            ],
            experiences: vec![
                Experience {
                    id: "e1",
                    skills: &["s-rust"],
                },
                Experience {
                    id: "e2",
                    skills: &["s-sql", "s-stats"],
                },
            ],
        }
    }

    fn metiers(&self, data_set: &str) -> Option<&[Metier]> {
        self.data_sets
            .iter()
            .find(|(name, _)| *name == data_set)
            .map(|(_, metiers)| metiers.as_slice())
    }
}

pub type Db = Arc<Catalog>;

pub fn app() -> Router {
    let db: Db = Arc::new(Catalog::fixture());
    Router::new()
        .route("/api/data_sets", get(list_data_sets))
        .route("/api/competences", get(list_competences))
        .route("/api/metiers_suggestion", post(metiers_suggestion))
        .route("/api/job_recommendation", post(job_recommendation))
        .route("/api/echo", get(echo).post(echo))
        .route("/api/status/{code}", get(status))
        .route("/api/text", get(text))
        .route("/api/padding", get(padding))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_data_sets(State(db): State<Db>) -> Json<DataSets> {
    Json(DataSets {
        default: db.default_data_set.to_string(),
        datasets: db.data_sets.iter().map(|(name, _)| name.to_string()).collect(),
    })
}

#[derive(Deserialize)]
struct CompetenceQuery {
    dataset: String,
}

async fn list_competences(
    State(db): State<Db>,
    Query(query): Query<CompetenceQuery>,
) -> Result<Json<Vec<Competence>>, StatusCode> {
    let metiers = db.metiers(&query.dataset).ok_or(StatusCode::NOT_FOUND)?;
    let names: BTreeSet<&str> = metiers
        .iter()
        .flat_map(|m| m.competences.iter().copied())
        .collect();
    Ok(Json(
        names
            .into_iter()
            .map(|name| Competence {
                name: name.to_string(),
            })
            .collect(),
    ))
}

async fn metiers_suggestion(
    State(db): State<Db>,
    Json(input): Json<MetierQuery>,
) -> Result<Json<MetierSuggestions>, StatusCode> {
    let metiers = db.metiers(&input.dataset.name).ok_or(StatusCode::NOT_FOUND)?;
    let known: BTreeSet<&str> = input.competences.iter().map(|c| c.name.as_str()).collect();
    let mut scores: Vec<MetierScore> = metiers
        .iter()
        .map(|m| MetierScore {
            metier: m.name.to_string(),
            score: coverage(m.competences, &known),
        })
        .collect();
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(Json(MetierSuggestions { scores }))
}

#[derive(Deserialize)]
struct RecommendationQuery {
    #[serde(default)]
    return_graph: bool,
}

async fn job_recommendation(
    State(db): State<Db>,
    Query(query): Query<RecommendationQuery>,
    Json(experiences): Json<Vec<String>>,
) -> Result<Json<JobRecommendation>, StatusCode> {
    let mut skills = BTreeSet::new();
    for id in &experiences {
        let experience = db
            .experiences
            .iter()
            .find(|e| e.id == id.as_str())
            .ok_or(StatusCode::NOT_FOUND)?;
        skills.extend(experience.skills.iter().copied());
    }

    let mut scores: Vec<JobScore> = db
        .jobs
        .iter()
        .map(|job| JobScore {
            job: JobRef {
                id: job.id.to_string(),
                name: job.name.to_string(),
            },
            score: coverage(job.skills, &skills),
        })
        .collect();
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));

    let graph = query.return_graph.then(|| JobGraph {
        edges: shared_skill_edges(&db.jobs),
    });
    Ok(Json(JobRecommendation { scores, graph }))
}

/// Reflects the request back so clients can inspect what they sent.
async fn echo(
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body).unwrap_or(Value::String(body))
    };
    Json(json!({
        "method": method.as_str(),
        "query": query,
        "content_type": content_type,
        "body": body,
    }))
}

async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, [("x-mock-status", code.to_string())])
}

async fn text() -> &'static str {
    "plain text from the backend"
}

#[derive(Deserialize)]
struct PaddingQuery {
    size: usize,
}

/// A JSON string of `size` filler characters, for large response bodies.
async fn padding(Query(query): Query<PaddingQuery>) -> Json<String> {
    Json("x".repeat(query.size))
}

fn coverage(required: &[&str], known: &BTreeSet<&str>) -> f64 {
    if required.is_empty() {
        return 0.0;
    }
    let hits = required.iter().filter(|r| known.contains(*r)).count();
    hits as f64 / required.len() as f64
}

fn shared_skill_edges(jobs: &[Job]) -> Vec<(String, String)> {
    let mut edges = Vec::new();
    for (i, a) in jobs.iter().enumerate() {
        for b in &jobs[i + 1..] {
            if a.skills.iter().any(|s| b.skills.contains(s)) {
                edges.push((a.id.to_string(), b.id.to_string()));
            }
        }
    }
    edges
}
