#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    config: SessionConfig,
    transcript_path: String,
    state_path: Option<String>,
    archive_path: Option<String>,
    ingest_now: Option<bool>,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    schema_version: String,
    session_id: String,
    resumed: bool,
    replaced_active_session: bool,
    status: SessionStatus,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, HttpApiError> {
    if request.config.schema_version != SCHEMA_VERSION_V1 {
        return Err(HttpApiError::invalid_command(
            "Unsupported schema_version",
            Some(format!(
                "got={} expected={}",
                request.config.schema_version, SCHEMA_VERSION_V1
            )),
        ));
    }
    if request.transcript_path.trim().is_empty() {
        return Err(HttpApiError::invalid_command(
            "transcript_path must not be empty",
            None,
        ));
    }

    let mut inner = state.inner.lock().await;
    let replaced_active_session = inner.api.is_some();

    let mut api = EngineApi::from_config(request.config.clone(), request.transcript_path.clone());
    let mut resumed = false;
    if let Some(state_path) = request
        .state_path
        .filter(|path| !path.trim().is_empty())
    {
        resumed = api
            .attach_state_store(state_path)
            .map_err(|err| HttpApiError::from_facade(FacadeError::Store(err)))?;
    }
    if let Some(archive_path) = request
        .archive_path
        .filter(|path| !path.trim().is_empty())
    {
        api.attach_archive(archive_path)
            .map_err(|err| HttpApiError::from_facade(FacadeError::Archive(err)))?;
    }

    if request.ingest_now.unwrap_or(false) {
        api.ingest_pass().map_err(HttpApiError::from_facade)?;
    }

    let status = api.status();
    let session_id = api.session_id().to_string();
    inner.api = Some(api);

    Ok(Json(CreateSessionResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        session_id,
        resumed,
        replaced_active_session,
        status,
    }))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    schema_version: String,
    status: SessionStatus,
    transcript_path: String,
    last_persistence_error: Option<String>,
}

async fn get_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let api = require_session(&inner, &session_id)?;

    Ok(Json(StatusResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        status: api.status(),
        transcript_path: api.transcript_path().display().to_string(),
        last_persistence_error: api.last_persistence_error().map(str::to_string),
    }))
}

async fn run_ingest(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<IngestReport>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let api = require_session_mut(&mut inner, &session_id)?;

    let report = api.ingest_pass().map_err(HttpApiError::from_facade)?;
    Ok(Json(report))
}

/// Serves the persisted snapshot, never the live in-memory state: this is
/// the documented read path for concurrent dashboard renderers.
async fn get_state(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TrialState>, HttpApiError> {
    let inner = state.inner.lock().await;
    let api = require_session(&inner, &session_id)?;

    let persisted = api
        .load_persisted_state()
        .map_err(HttpApiError::from_facade)?
        .ok_or_else(|| {
            HttpApiError::invalid_query("no state snapshot has been persisted yet", None)
        })?;
    Ok(Json(persisted))
}

#[derive(Debug, Deserialize)]
struct ActionsQuery {
    priority: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ActionsResponse {
    schema_version: String,
    session_id: String,
    actions: Vec<TrialAction>,
}

async fn get_actions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ActionsQuery>,
) -> Result<Json<ActionsResponse>, HttpApiError> {
    let priority = parse_priority(query.priority.as_deref())?;
    let limit = query.limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let inner = state.inner.lock().await;
    let api = require_session(&inner, &session_id)?;

    let actions = api
        .pending_actions()
        .iter()
        .filter(|action| priority.map_or(true, |wanted| action.priority == wanted))
        .take(limit)
        .cloned()
        .collect::<Vec<_>>();

    Ok(Json(ActionsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        session_id,
        actions,
    }))
}

#[derive(Debug, Deserialize)]
struct ContradictionsQuery {
    exploited: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ContradictionsResponse {
    schema_version: String,
    session_id: String,
    contradictions: Vec<Contradiction>,
}

async fn get_contradictions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ContradictionsQuery>,
) -> Result<Json<ContradictionsResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let api = require_session(&inner, &session_id)?;

    let contradictions = api
        .contradictions()
        .iter()
        .filter(|contradiction| {
            query
                .exploited
                .map_or(true, |wanted| contradiction.exploited == wanted)
        })
        .cloned()
        .collect::<Vec<_>>();

    Ok(Json(ContradictionsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        session_id,
        contradictions,
    }))
}

#[derive(Debug, Serialize)]
struct ExploitResponse {
    schema_version: String,
    session_id: String,
    contradiction_id: String,
    exploited: bool,
}

async fn exploit_contradiction(
    State(state): State<AppState>,
    Path((session_id, contradiction_id)): Path<(String, String)>,
) -> Result<Json<ExploitResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let api = require_session_mut(&mut inner, &session_id)?;

    let found = api
        .mark_contradiction_exploited(&contradiction_id)
        .map_err(HttpApiError::from_facade)?;
    if !found {
        return Err(HttpApiError::invalid_command(
            "unknown contradiction_id",
            Some(format!("contradiction_id={contradiction_id}")),
        ));
    }

    Ok(Json(ExploitResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        session_id,
        contradiction_id,
        exploited: true,
    }))
}

async fn get_replay(
    State(state): State<AppState>,
    Path((session_id, cursor)): Path<(String, u64)>,
) -> Result<Json<TrialState>, HttpApiError> {
    let inner = state.inner.lock().await;
    let api = require_session(&inner, &session_id)?;

    let snapshot = api
        .replay_at(cursor)
        .map_err(HttpApiError::from_facade)?
        .ok_or_else(|| {
            HttpApiError::invalid_query(
                "no archived snapshot at or before cursor",
                Some(format!("cursor={cursor}")),
            )
        })?;
    Ok(Json(snapshot))
}

fn parse_priority(raw: Option<&str>) -> Result<Option<ActionPriority>, HttpApiError> {
    match raw {
        None => Ok(None),
        Some("P0") | Some("p0") => Ok(Some(ActionPriority::P0)),
        Some("P1") | Some("p1") => Ok(Some(ActionPriority::P1)),
        Some("P2") | Some("p2") => Ok(Some(ActionPriority::P2)),
        Some(other) => Err(HttpApiError::invalid_query(
            "priority must be one of P0, P1, P2",
            Some(format!("got={other}")),
        )),
    }
}
