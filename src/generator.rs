use std::sync::Arc;
use std::time::Duration;

use crate::config::GeneratorSpec;
use crate::error::{GpxtxError, TemplateError};
use crate::gpx_types::WaypointSet;
use crate::parser::load_waypoints;
use crate::shutdown::Shutdown;
use crate::template::{Params, Template, Value};
use crate::transport::Transport;

/// A generator spec resolved into its waypoints and compiled template.
/// Immutable once built and shared read-only with its loop.
#[derive(Debug, Clone)]
pub struct CompiledGenerator {
    description: String,
    frequency: Duration,
    index_offset: usize,
    waypoints: WaypointSet,
    template: Template,
}

impl CompiledGenerator {
    pub fn new(
        description: impl Into<String>,
        frequency: Duration,
        index_offset: usize,
        waypoints: WaypointSet,
        template: Template,
    ) -> Self {
        Self {
            description: description.into(),
            frequency,
            index_offset,
            waypoints,
            template,
        }
    }

    /// Load the waypoint file and compile the template named by `spec`.
    pub fn compile(spec: &GeneratorSpec) -> Result<Self, GpxtxError> {
        log::info!("loading generator '{}'", spec.description);

        log::info!(
            "loading waypoint file {} ({})",
            spec.waypoint_file.display(),
            spec.waypoint_file_type
        );
        let waypoints = load_waypoints(&spec.waypoint_file, spec.waypoint_file_type)?;

        log::info!("compiling template for '{}'", spec.description);
        log::debug!("template source: {}", spec.template);
        let template = Template::compile(&spec.template).map_err(|source| {
            GpxtxError::TemplateCompile {
                generator: spec.description.clone(),
                source,
            }
        })?;

        Ok(Self::new(
            spec.description.clone(),
            spec.frequency(),
            spec.index_offset,
            waypoints,
            template,
        ))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    pub fn index_offset(&self) -> usize {
        self.index_offset
    }

    pub fn waypoints(&self) -> &WaypointSet {
        &self.waypoints
    }

    /// A fresh cursor over this generator's waypoints, starting at its
    /// index offset.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.index_offset, self.waypoints.len())
    }

    /// Render parameters for the cursor's current position.
    ///
    /// Panics if `cursor` was not built for this generator's waypoint set;
    /// use [`CompiledGenerator::cursor`].
    pub fn params(&self, cursor: &Cursor) -> Params {
        let wp = &self.waypoints[cursor.index()];
        let mut params = Params::with_capacity(5);
        params.insert("lat".to_string(), Value::Float(wp.lat));
        params.insert("lon".to_string(), Value::Float(wp.lon));
        params.insert("index".to_string(), Value::from(cursor.index()));
        params.insert("count".to_string(), Value::from(cursor.count()));
        params.insert("generator".to_string(), Value::from(self.description.as_str()));
        params
    }

    pub fn render(&self, cursor: &Cursor) -> Result<String, TemplateError> {
        self.template.render(&self.params(cursor))
    }
}

/// Position of one loop within its waypoint set, plus how many messages it
/// has produced. Private to the loop that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
    count: u64,
    len: usize,
}

impl Cursor {
    /// Offsets at or beyond the last waypoint fall back to the first.
    pub fn new(index_offset: usize, len: usize) -> Self {
        let index = if index_offset < len.saturating_sub(1) {
            index_offset
        } else {
            0
        };
        Self {
            index,
            count: 0,
            len,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn advance(&mut self) {
        self.count += 1;
        self.index += 1;
        if self.index >= self.len {
            self.index = 0;
        }
    }
}

/// Why a generator loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    NoWaypoints,
    RenderFailed,
    Cancelled,
    /// The loop's task panicked.
    Panicked,
}

/// Walk the waypoints forever: render, send, sleep, advance. Send failures
/// are logged and skipped; a render failure ends the loop. Shutdown is
/// observed between iterations and while a send or sleep is pending.
pub async fn run_generator(
    generator: Arc<CompiledGenerator>,
    transport: Arc<dyn Transport>,
    mut shutdown: Shutdown,
) -> LoopExit {
    let name = generator.description();
    if generator.waypoints().is_empty() {
        log::warn!("generator '{name}' has no waypoints, not starting");
        return LoopExit::NoWaypoints;
    }

    log::info!("starting generator '{name}'");
    let mut cursor = generator.cursor();

    loop {
        if shutdown.is_triggered() {
            log::info!("generator '{name}' stopped after {} messages", cursor.count());
            return LoopExit::Cancelled;
        }

        log::info!(
            "generating message generator='{name}' index={} count={}",
            cursor.index(),
            cursor.count()
        );
        let msg = match generator.render(&cursor) {
            Ok(msg) => msg,
            Err(e) => {
                log::error!("error executing message template for '{name}', exiting generator: {e}");
                return LoopExit::RenderFailed;
            }
        };

        log::debug!("sending rendered message generator='{name}' msg={msg}");
        tokio::select! {
            sent = transport.send(&msg) => {
                if let Err(e) = sent {
                    log::error!("generator '{name}': {e}");
                }
            }
            _ = shutdown.triggered() => {
                log::info!("generator '{name}' stopped during send after {} messages", cursor.count());
                return LoopExit::Cancelled;
            }
        }

        let frequency = generator.frequency();
        log::debug!("wait on interval after send generator='{name}' frequency={frequency:?}");
        if frequency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(frequency) => {}
                _ = shutdown.triggered() => {}
            }
        }

        cursor.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SendError;
    use crate::gpx_types::Waypoint;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Sink {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Sink {
        async fn send(&self, payload: &str) -> Result<(), SendError> {
            self.sent.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    fn generator(template: &str, offset: usize, points: &[(f64, f64)]) -> Arc<CompiledGenerator> {
        Arc::new(CompiledGenerator::new(
            "test",
            Duration::from_secs(1),
            offset,
            points.iter().copied().collect(),
            Template::compile(template).unwrap(),
        ))
    }

    #[test]
    fn test_cursor_offset_within_range() {
        assert_eq!(Cursor::new(0, 5).index(), 0);
        assert_eq!(Cursor::new(3, 5).index(), 3);
    }

    #[test]
    fn test_cursor_offset_out_of_range_clamps_to_zero() {
        assert_eq!(Cursor::new(4, 5).index(), 0);
        assert_eq!(Cursor::new(99, 5).index(), 0);
        assert_eq!(Cursor::new(0, 1).index(), 0);
        assert_eq!(Cursor::new(1, 1).index(), 0);
    }

    #[test]
    fn test_cursor_returns_to_start_after_full_cycle() {
        for len in 1..8 {
            for offset in 0..len + 2 {
                let mut cursor = Cursor::new(offset, len);
                let start = cursor.index();
                for _ in 0..len {
                    cursor.advance();
                }
                assert_eq!(cursor.index(), start, "len={len} offset={offset}");
                assert_eq!(cursor.count(), len as u64);
            }
        }
    }

    #[test]
    fn test_cursor_wraps_in_order() {
        let mut cursor = Cursor::new(1, 3);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(cursor.index());
            cursor.advance();
        }
        assert_eq!(seen, vec![1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_cursor_matches_generator() {
        let points = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
        assert_eq!(generator("{{.lat}}", 2, &points).cursor(), Cursor::new(2, 4));
        assert_eq!(generator("{{.lat}}", 3, &points).cursor().index(), 0);

        let g = generator("{{.lat}}", 1, &points);
        let mut cursor = g.cursor();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(g.render(&cursor).unwrap());
            cursor.advance();
        }
        assert_eq!(seen, vec!["1", "2", "3", "0", "1"]);
    }

    #[test]
    fn test_params_carry_position_and_counters() {
        let g = generator("{{.lat}}", 0, &[(1.0, 2.0), (12.34, -56.78)]);
        let mut cursor = Cursor::new(0, 2);
        cursor.advance();
        let params = g.params(&cursor);
        assert_eq!(params["lat"], Value::Float(12.34));
        assert_eq!(params["lon"], Value::Float(-56.78));
        assert_eq!(params["index"], Value::Int(1));
        assert_eq!(params["count"], Value::Int(1));
        assert_eq!(params["generator"], Value::from("test"));
    }

    #[test]
    fn test_render_round_trip() {
        let g = generator("{{.lat}} {{.lon}}", 0, &[(12.34, -56.78)]);
        let out = g.render(&Cursor::new(0, 1)).unwrap();
        assert!(out.contains("12.34"));
        assert!(out.contains("-56.78"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_message_uses_offset() {
        let points = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)];
        for (offset, expected) in [(0, "0"), (1, "1"), (2, "0"), (7, "0")] {
            let sink = Arc::new(Sink::default());
            let (trigger, shutdown) = crate::shutdown::channel();
            let task = tokio::spawn(run_generator(
                generator("{{.lat}}", offset, &points),
                sink.clone(),
                shutdown,
            ));
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.trigger();
            assert_eq!(task.await.unwrap(), LoopExit::Cancelled);
            assert_eq!(sink.sent.lock().unwrap()[0], expected, "offset={offset}");
        }
    }

    /// Accepts a send and never finishes it, like a dial into a black hole.
    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn send(&self, _payload: &str) -> Result<(), SendError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_pending_send() {
        let (trigger, shutdown) = crate::shutdown::channel();
        let task = tokio::spawn(run_generator(
            generator("{{.lat}}", 0, &[(1.0, 2.0)]),
            Arc::new(Stalled),
            shutdown,
        ));
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(!task.is_finished());
        trigger.trigger();
        assert_eq!(task.await.unwrap(), LoopExit::Cancelled);
    }

    #[tokio::test]
    async fn test_render_failure_ends_loop() {
        let sink = Arc::new(Sink::default());
        let exit = run_generator(
            generator("{{.altitude}}", 0, &[(1.0, 2.0)]),
            sink.clone(),
            Shutdown::never(),
        )
        .await;
        assert_eq!(exit, LoopExit::RenderFailed);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_waypoints_never_start() {
        let sink = Arc::new(Sink::default());
        let exit = run_generator(generator("{{.lat}}", 0, &[]), sink.clone(), Shutdown::never()).await;
        assert_eq!(exit, LoopExit::NoWaypoints);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_compile_reports_template_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"<gpx><wpt lat="1" lon="2"/></gpx>"#).unwrap();
        let spec = GeneratorSpec {
            description: "broken".to_string(),
            frequency: 1,
            waypoint_file: file.path().to_path_buf(),
            waypoint_file_type: Default::default(),
            index_offset: 0,
            template: "{{ .lat ".to_string(),
        };
        let err = CompiledGenerator::compile(&spec).unwrap_err();
        assert!(matches!(err, GpxtxError::TemplateCompile { ref generator, .. } if generator == "broken"));

        let ok = CompiledGenerator::compile(&GeneratorSpec {
            template: "{{.lat}}".to_string(),
            ..spec
        })
        .unwrap();
        assert_eq!(ok.waypoints().get(0), Some(&Waypoint::new(1.0, 2.0)));
    }
}
