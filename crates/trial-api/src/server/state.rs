#[derive(Clone)]
struct AppState {
    inner: std::sync::Arc<Mutex<ServerInner>>,
}

impl AppState {
    fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(ServerInner::default())),
        }
    }
}

#[derive(Debug, Default)]
struct ServerInner {
    api: Option<EngineApi>,
}

fn require_session<'a>(
    inner: &'a ServerInner,
    session_id: &str,
) -> Result<&'a EngineApi, HttpApiError> {
    let Some(api) = inner.api.as_ref() else {
        return Err(HttpApiError::session_not_found(session_id, None));
    };

    if api.session_id() != session_id {
        return Err(HttpApiError::session_not_found(
            session_id,
            Some(api.session_id()),
        ));
    }

    Ok(api)
}

fn require_session_mut<'a>(
    inner: &'a mut ServerInner,
    session_id: &str,
) -> Result<&'a mut EngineApi, HttpApiError> {
    let active_session_id = inner.api.as_ref().map(|api| api.session_id().to_string());
    let Some(api) = inner.api.as_mut() else {
        return Err(HttpApiError::session_not_found(session_id, None));
    };

    if api.session_id() != session_id {
        return Err(HttpApiError::session_not_found(
            session_id,
            active_session_id.as_deref(),
        ));
    }

    Ok(api)
}
