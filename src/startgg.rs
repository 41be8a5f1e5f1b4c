use {
    chrono::TimeDelta,
    graphql_client::{
        GraphQLQuery,
        QueryBody,
    },
    crate::prelude::*,
};

const ENDPOINT: &str = "https://api.start.gg/gql/alpha";

/// From https://dev.start.gg/docs/rate-limits:
///
/// > You may not average more than 80 requests per 60 seconds.
const RATE_LIMIT: Duration = Duration::from_millis(60_000 / 80);

/// How far into the future tournaments are listed.
const WINDOW_DAYS: i64 = 90;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error("{source} in start.gg response: {text}")]
    Json {
        source: serde_json::Error,
        text: String,
    },
    #[error("{} GraphQL errors", .0.len())]
    GraphQL(Vec<graphql_client::Error>),
    #[error("GraphQL response returned neither `data` nor `errors`")]
    NoDataNoErrors,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdInner {
    Number(serde_json::Number),
    String(String),
}

impl From<IdInner> for ID {
    fn from(inner: IdInner) -> Self {
        Self(match inner {
            IdInner::Number(n) => n.to_string(),
            IdInner::String(s) => s,
        })
    }
}

/// start.gg sends IDs as numbers even though the schema declares them as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "IdInner")]
pub(crate) struct ID(pub(crate) String);

impl fmt::Display for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

type Int = i64;
type Timestamp = i64;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Tournament {
    pub(crate) id: ID,
    pub(crate) slug: String,
    pub(crate) name: String,
    pub(crate) start_at: Timestamp,
    pub(crate) country_code: Option<String>,
    pub(crate) addr_state: Option<String>,
    pub(crate) venue_address: Option<String>,
    /// `None` if start.gg doesn't list any events for this tournament yet.
    pub(crate) events: Option<Vec<Option<Event>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct Event {
    pub(crate) videogame: Option<Videogame>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct Videogame {
    pub(crate) name: Option<String>,
}

pub(crate) struct TournamentsQuery;

pub(crate) mod tournaments_query {
    use super::*;

    pub(crate) const OPERATION_NAME: &str = "TournamentsQuery";
    pub(crate) const QUERY: &str = include_str!("../assets/graphql/startgg-tournaments-query.graphql");

    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct Variables {
        pub(crate) page: Int,
        pub(crate) start_at: Timestamp,
        pub(crate) end_at: Timestamp,
    }

    impl Variables {
        /// Variables for one page of tournaments starting between `now` and the end of the listing window.
        pub(crate) fn for_page(page: u32, now: DateTime<Utc>) -> Self {
            Self {
                page: page.into(),
                start_at: now.timestamp(),
                end_at: (now + TimeDelta::days(WINDOW_DAYS)).timestamp(),
            }
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct ResponseData {
        pub(crate) tournaments: Option<TournamentsQueryTournaments>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct TournamentsQueryTournaments {
        pub(crate) nodes: Option<Vec<Option<Tournament>>>,
    }
}

impl GraphQLQuery for TournamentsQuery {
    type Variables = tournaments_query::Variables;
    type ResponseData = tournaments_query::ResponseData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: tournaments_query::QUERY,
            operation_name: tournaments_query::OPERATION_NAME,
        }
    }
}

/// Decodes a GraphQL response body, logging any errors the API reported.
fn decode<T: GraphQLQuery>(text: String) -> Result<T::ResponseData, Error> {
    let graphql_client::Response { data, errors, extensions: _ } = match serde_json::from_str::<graphql_client::Response<T::ResponseData>>(&text) {
        Ok(response) => response,
        Err(source) => return Err(Error::Json { source, text }),
    };
    if let Some(ref errors) = errors {
        for error in errors {
            log::error!("start.gg API error: {}", error.message);
        }
    }
    match (data, errors) {
        (Some(_), Some(errors)) if !errors.is_empty() => Err(Error::GraphQL(errors)),
        (Some(data), _) => Ok(data),
        (None, Some(errors)) => Err(Error::GraphQL(errors)),
        (None, None) => Err(Error::NoDataNoErrors),
    }
}

/// Where the run controller gets its tournaments from.
#[async_trait]
pub(crate) trait TournamentSource {
    /// Returns one page of upcoming tournaments. An empty list means there are no more pages in the current window.
    ///
    /// Errors reported by the API are returned as [`Error::GraphQL`] and are distinct from an empty page.
    async fn tournaments(&mut self, page: u32) -> Result<Vec<Tournament>, Error>;
}

pub(crate) struct Client {
    http_client: reqwest::Client,
    auth_token: String,
    next_request: Instant,
}

impl Client {
    pub(crate) fn new(http_client: reqwest::Client, auth_token: String) -> Self {
        Self {
            next_request: Instant::now(),
            http_client, auth_token,
        }
    }

    async fn query<T: GraphQLQuery>(&mut self, variables: T::Variables) -> Result<T::ResponseData, Error>
    where T::Variables: Send {
        sleep_until(self.next_request).await;
        let response = self.http_client.post(ENDPOINT)
            .bearer_auth(&self.auth_token)
            .json(&T::build_query(variables))
            .send().await?
            .error_for_status();
        self.next_request = Instant::now() + RATE_LIMIT;
        let text = response?.text().await?;
        decode::<T>(text)
    }
}

#[async_trait]
impl TournamentSource for Client {
    async fn tournaments(&mut self, page: u32) -> Result<Vec<Tournament>, Error> {
        let variables = tournaments_query::Variables::for_page(page, Utc::now());
        log::debug!("fetching start.gg tournaments page {page}");
        let tournaments_query::ResponseData { tournaments } = self.query::<TournamentsQuery>(variables).await?;
        Ok(tournaments
            .and_then(|tournaments| tournaments.nodes)
            .unwrap_or_default()
            .into_iter()
            .filter_map(identity)
            .collect())
    }
}
