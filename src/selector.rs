use crate::cancel::CancelFlag;
use crate::error::{AssemblyError, SourceError};
use crate::keywords::rotating_keyword;
use crate::planner::Window;
use crate::source::{ClipHandle, ClipQuery, ClipSource};
use crate::{logi, logok, logw};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Cross-window state of one assembly run.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    last_successful: Option<ClipHandle>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_successful(&self) -> Option<&ClipHandle> {
        self.last_successful.as_ref()
    }
}

/// Which tier of the fallback chain produced a clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipOrigin {
    Remote { keyword: String },
    Local,
    Reused,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub clip: ClipHandle,
    pub origin: ClipOrigin,
}

pub(crate) fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Runs the fallback chain for each window: remote search, local library,
/// previous scene, placeholder.
pub struct ClipSelector {
    remote: Option<Arc<dyn ClipSource>>,
    local: Option<Arc<dyn ClipSource>>,
    placeholder: Option<Arc<dyn ClipSource>>,
    keyword_pool: Vec<String>,
    rng: StdRng,
    cancel: CancelFlag,
    /// Local picks so far; drives round-robin over ordered libraries.
    local_picks: usize,
}

impl ClipSelector {
    pub fn new(keyword_pool: Vec<String>) -> Self {
        Self {
            remote: None,
            local: None,
            placeholder: None,
            keyword_pool,
            rng: StdRng::seed_from_u64(now_seed()),
            cancel: CancelFlag::new(),
            local_picks: 0,
        }
    }

    pub fn with_remote(mut self, source: Arc<dyn ClipSource>) -> Self {
        self.remote = Some(source);
        self
    }

    pub fn with_local(mut self, source: Arc<dyn ClipSource>) -> Self {
        self.local = Some(source);
        self
    }

    pub fn with_placeholder(mut self, source: Arc<dyn ClipSource>) -> Self {
        self.placeholder = Some(source);
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Candidates from one source. Source failures become an empty set,
    /// except cancellation, which ends the run.
    async fn query(
        &self,
        source: &dyn ClipSource,
        query: &ClipQuery,
    ) -> Result<Vec<ClipHandle>, AssemblyError> {
        self.cancel.check()?;
        match source.candidates(query).await {
            Ok(found) => Ok(found),
            Err(SourceError::Cancelled) => Err(AssemblyError::Cancelled),
            Err(err) => {
                self.cancel.check()?;
                logw(format!("{} source: {}", source.name(), err));
                Ok(Vec::new())
            }
        }
    }

    async fn try_remote(
        &self,
        window: &Window,
        primary: Option<&str>,
    ) -> Result<Option<Selection>, AssemblyError> {
        let Some(remote) = self.remote.as_deref() else {
            return Ok(None);
        };
        let rotating = rotating_keyword(&self.keyword_pool, window.index);

        let Some(first) = primary.or(rotating) else {
            return Ok(None);
        };
        logi(format!("Window {}: searching footage for '{}'", window.index + 1, first));
        let found = self
            .query(remote, &ClipQuery::keyword(first, window.duration))
            .await?;
        if let Some(clip) = found.into_iter().next() {
            return Ok(Some(Selection {
                clip,
                origin: ClipOrigin::Remote {
                    keyword: first.to_string(),
                },
            }));
        }

        let Some(retry) = rotating.filter(|k| *k != first) else {
            return Ok(None);
        };
        logi(format!("Window {}: retrying with keyword '{}'", window.index + 1, retry));
        let found = self
            .query(remote, &ClipQuery::keyword(retry, window.duration))
            .await?;
        Ok(found.into_iter().next().map(|clip| Selection {
            clip,
            origin: ClipOrigin::Remote {
                keyword: retry.to_string(),
            },
        }))
    }

    async fn try_local(
        &mut self,
        window: &Window,
        hints: Option<&[String]>,
    ) -> Result<Option<Selection>, AssemblyError> {
        let Some(local) = self.local.clone() else {
            return Ok(None);
        };
        let candidates = self
            .query(local.as_ref(), &ClipQuery::any(window.duration))
            .await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let chosen = if local.ordered() {
            let clip = &candidates[self.local_picks % candidates.len()];
            self.local_picks += 1;
            Some(clip)
        } else {
            let hints: Vec<String> = hints
                .unwrap_or_default()
                .iter()
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect();
            let tagged: Vec<&ClipHandle> = candidates
                .iter()
                .filter(|c| {
                    let name = c.name_lower();
                    hints.iter().any(|h| name.contains(h.as_str()))
                })
                .collect();

            if tagged.is_empty() {
                candidates.choose(&mut self.rng)
            } else {
                tagged.choose(&mut self.rng).copied()
            }
        };
        Ok(chosen.map(|clip| Selection {
            clip: clip.clone(),
            origin: ClipOrigin::Local,
        }))
    }

    async fn try_placeholder(&self, window: &Window) -> Result<Option<Selection>, AssemblyError> {
        let Some(placeholder) = self.placeholder.as_deref() else {
            return Ok(None);
        };
        let found = self
            .query(placeholder, &ClipQuery::any(window.duration))
            .await?;
        Ok(found.into_iter().next().map(|clip| Selection {
            clip,
            origin: ClipOrigin::Placeholder,
        }))
    }

    /// Picks a clip for `window`. Fails only on cancellation, or when no
    /// clip has ever been selected in this run and the placeholder cannot
    /// be produced.
    pub async fn select(
        &mut self,
        window: &Window,
        primary_keyword: Option<&str>,
        hints: Option<&[String]>,
        state: &mut SelectionState,
    ) -> Result<Selection, AssemblyError> {
        let mut chosen = self.try_remote(window, primary_keyword).await?;

        if chosen.is_none() {
            chosen = self.try_local(window, hints).await?;
            if let Some(sel) = &chosen {
                logok(format!(
                    "Window {}: using local clip {}",
                    window.index + 1,
                    sel.clip.locator.display()
                ));
            }
        }

        if chosen.is_none() {
            self.cancel.check()?;
            if let Some(previous) = state.last_successful() {
                logw(format!(
                    "Window {}: no new footage, continuing previous scene {}",
                    window.index + 1,
                    previous.locator.display()
                ));
                return Ok(Selection {
                    clip: previous.clone(),
                    origin: ClipOrigin::Reused,
                });
            }
            chosen = self.try_placeholder(window).await?;
            if chosen.is_some() {
                logw(format!("Window {}: using placeholder footage", window.index + 1));
            }
        }

        let selection = chosen.ok_or(AssemblyError::NoFootageAvailable {
            window: window.index,
        })?;
        state.last_successful = Some(selection.clip.clone());
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Source scripted per keyword; `None` keyword answers come from `any`.
    #[derive(Default)]
    struct ScriptedSource {
        by_keyword: HashMap<String, ClipHandle>,
        any: Vec<ClipHandle>,
        fail: bool,
        cancelled: bool,
        ordered: bool,
        calls: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn calls(&self) -> Vec<Option<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClipSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn ordered(&self) -> bool {
            self.ordered
        }

        async fn candidates(&self, query: &ClipQuery) -> Result<Vec<ClipHandle>, SourceError> {
            self.calls.lock().unwrap().push(query.keyword.clone());
            if self.cancelled {
                return Err(SourceError::Cancelled);
            }
            if self.fail {
                return Err(SourceError::NoAssets("lib".into()));
            }
            match &query.keyword {
                Some(k) => Ok(self.by_keyword.get(k).cloned().into_iter().collect()),
                None => Ok(self.any.clone()),
            }
        }
    }

    fn clip(name: &str) -> ClipHandle {
        ClipHandle::new(name, 3.0, 1080, 1920).unwrap()
    }

    fn window(index: usize, text: &str) -> Window {
        Window {
            index,
            start: index as f64,
            end: index as f64 + 1.0,
            duration: 1.0,
            text: text.to_string(),
        }
    }

    fn pool() -> Vec<String> {
        vec!["nature".into(), "city".into()]
    }

    #[tokio::test]
    async fn remote_primary_keyword_wins() {
        let remote = Arc::new(ScriptedSource {
            by_keyword: HashMap::from([("ocean waves".to_string(), clip("ocean.mp4"))]),
            ..Default::default()
        });
        let mut selector = ClipSelector::new(pool()).with_remote(remote.clone());
        let mut state = SelectionState::new();

        let sel = selector
            .select(&window(0, "ocean waves crash"), Some("ocean waves"), None, &mut state)
            .await
            .unwrap();
        assert_eq!(sel.origin, ClipOrigin::Remote { keyword: "ocean waves".into() });
        assert_eq!(state.last_successful().unwrap().locator, sel.clip.locator);
        assert_eq!(remote.calls(), vec![Some("ocean waves".to_string())]);
    }

    #[tokio::test]
    async fn remote_retries_once_with_rotating_keyword() {
        let remote = Arc::new(ScriptedSource {
            by_keyword: HashMap::from([("city".to_string(), clip("city.mp4"))]),
            ..Default::default()
        });
        let mut selector = ClipSelector::new(pool()).with_remote(remote.clone());
        let mut state = SelectionState::new();

        let sel = selector
            .select(&window(1, "zzz qqq"), Some("zzz qqq"), None, &mut state)
            .await
            .unwrap();
        assert_eq!(sel.origin, ClipOrigin::Remote { keyword: "city".into() });
        assert_eq!(
            remote.calls(),
            vec![Some("zzz qqq".to_string()), Some("city".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_caption_uses_rotating_keyword_without_duplicate_retry() {
        let remote = Arc::new(ScriptedSource::default());
        let local = Arc::new(ScriptedSource {
            any: vec![clip("stock.mp4")],
            ..Default::default()
        });
        let mut selector = ClipSelector::new(pool())
            .with_remote(remote.clone())
            .with_local(local);
        let mut state = SelectionState::new();

        let sel = selector.select(&window(2, ""), None, None, &mut state).await.unwrap();
        assert_eq!(sel.origin, ClipOrigin::Local);
        assert_eq!(remote.calls(), vec![Some("nature".to_string())]);
    }

    #[tokio::test]
    async fn local_prefers_hinted_names() {
        let local = Arc::new(ScriptedSource {
            any: vec![clip("a_city.mp4"), clip("Forest_Walk.mp4"), clip("b_city.mp4")],
            ..Default::default()
        });
        let mut selector = ClipSelector::new(pool())
            .with_local(local)
            .with_rng(StdRng::seed_from_u64(7));
        let mut state = SelectionState::new();
        let hints = vec!["FOREST".to_string()];

        for i in 0..5 {
            let sel = selector
                .select(&window(i, "text"), None, Some(&hints), &mut state)
                .await
                .unwrap();
            assert_eq!(sel.clip.name_lower(), "forest_walk.mp4");
        }
    }

    #[tokio::test]
    async fn local_random_choice_is_reproducible_with_seed() {
        let lib: Vec<ClipHandle> = (0..6).map(|i| clip(&format!("c{i}.mp4"))).collect();
        let mut picks = Vec::new();
        for _ in 0..2 {
            let local = Arc::new(ScriptedSource {
                any: lib.clone(),
                ..Default::default()
            });
            let mut selector = ClipSelector::new(pool())
                .with_local(local)
                .with_rng(StdRng::seed_from_u64(42));
            let mut state = SelectionState::new();
            let mut run = Vec::new();
            for i in 0..8 {
                let sel = selector.select(&window(i, "t"), None, None, &mut state).await.unwrap();
                run.push(sel.clip.locator);
            }
            picks.push(run);
        }
        assert_eq!(picks[0], picks[1]);
    }

    #[tokio::test]
    async fn failure_after_success_reuses_previous_clip() {
        let remote = Arc::new(ScriptedSource {
            by_keyword: HashMap::from([("first".to_string(), clip("first.mp4"))]),
            ..Default::default()
        });
        let placeholder = Arc::new(ScriptedSource {
            any: vec![clip("placeholder.mp4")],
            ..Default::default()
        });
        let mut selector = ClipSelector::new(Vec::new())
            .with_remote(remote)
            .with_placeholder(placeholder.clone());
        let mut state = SelectionState::new();

        let first = selector
            .select(&window(0, "first"), Some("first"), None, &mut state)
            .await
            .unwrap();
        let second = selector
            .select(&window(1, "second"), Some("second"), None, &mut state)
            .await
            .unwrap();

        assert_eq!(second.origin, ClipOrigin::Reused);
        assert_eq!(second.clip, first.clip);
        assert!(placeholder.calls().is_empty());
        assert_eq!(state.last_successful(), Some(&first.clip));
    }

    #[tokio::test]
    async fn first_window_falls_back_to_placeholder_then_reuses_it() {
        let local = Arc::new(ScriptedSource {
            fail: true,
            ..Default::default()
        });
        let placeholder = Arc::new(ScriptedSource {
            any: vec![clip("placeholder.mp4")],
            ..Default::default()
        });
        let mut selector = ClipSelector::new(pool())
            .with_local(local)
            .with_placeholder(placeholder.clone());
        let mut state = SelectionState::new();

        let first = selector.select(&window(0, "a"), None, None, &mut state).await.unwrap();
        assert_eq!(first.origin, ClipOrigin::Placeholder);
        for i in 1..4 {
            let sel = selector.select(&window(i, "b"), None, None, &mut state).await.unwrap();
            assert_eq!(sel.origin, ClipOrigin::Reused);
            assert_eq!(sel.clip, first.clip);
        }
        assert_eq!(placeholder.calls().len(), 1);
    }

    #[tokio::test]
    async fn no_sources_on_first_window_is_fatal() {
        let mut selector = ClipSelector::new(pool()).with_local(Arc::new(ScriptedSource {
            fail: true,
            ..Default::default()
        }));
        let mut state = SelectionState::new();
        let err = selector
            .select(&window(3, "a"), None, None, &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::NoFootageAvailable { window: 3 }));
        assert!(state.last_successful().is_none());
    }

    #[tokio::test]
    async fn continuity_holds_once_any_window_succeeded() {
        let mut selector = ClipSelector::new(Vec::new());
        let mut state = SelectionState {
            last_successful: Some(clip("seed.mp4")),
        };
        for i in 0..10 {
            let sel = selector.select(&window(i, "x"), Some("x"), None, &mut state).await;
            assert!(sel.is_ok());
        }
        assert_eq!(state.last_successful().unwrap().locator, clip("seed.mp4").locator);
    }

    #[tokio::test]
    async fn ordered_library_is_walked_round_robin() {
        let local = Arc::new(ScriptedSource {
            any: vec![clip("u0.mp4"), clip("u1.mp4"), clip("u2.mp4")],
            ordered: true,
            ..Default::default()
        });
        let mut selector = ClipSelector::new(pool()).with_local(local);
        let mut state = SelectionState::new();
        let hints = vec!["u2".to_string()];

        let mut names = Vec::new();
        for i in 0..5 {
            let sel = selector
                .select(&window(i, "t"), None, Some(&hints), &mut state)
                .await
                .unwrap();
            names.push(sel.clip.name_lower());
        }
        assert_eq!(names, vec!["u0.mp4", "u1.mp4", "u2.mp4", "u0.mp4", "u1.mp4"]);
    }

    #[tokio::test]
    async fn cancelled_source_ends_selection_without_fallback() {
        let remote = Arc::new(ScriptedSource {
            cancelled: true,
            ..Default::default()
        });
        let placeholder = Arc::new(ScriptedSource {
            any: vec![clip("placeholder.mp4")],
            ..Default::default()
        });
        let mut selector = ClipSelector::new(pool())
            .with_remote(remote)
            .with_placeholder(placeholder.clone());
        let mut state = SelectionState::new();

        let err = selector
            .select(&window(0, "ocean"), Some("ocean"), None, &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Cancelled));
        assert!(placeholder.calls().is_empty());
    }

    #[tokio::test]
    async fn raised_flag_wins_over_reuse() {
        let cancel = CancelFlag::new();
        let local = Arc::new(ScriptedSource {
            fail: true,
            ..Default::default()
        });
        let mut selector = ClipSelector::new(pool())
            .with_local(local.clone())
            .with_cancel(cancel.clone());
        let mut state = SelectionState {
            last_successful: Some(clip("seed.mp4")),
        };
        cancel.cancel();

        let err = selector
            .select(&window(1, "x"), None, None, &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Cancelled));
        assert!(local.calls().is_empty());
    }
}
