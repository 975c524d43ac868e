use iced::keyboard::{Key, key::Named};
use iced::widget::{canvas, center, column, text, text_input};
use iced::{Element, Length, Point, Subscription, Task, Theme, window};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use nodeflow::config::{EngineConfig, GridKind};
use nodeflow::engine::{CanvasEngine, EngineEventKind};
use nodeflow::error::{EngineError, GraphError};
use nodeflow::link::Link;
use nodeflow::node::{DataType, Node, NodeKind};
use nodeflow::scene::{NodeMatcher, Scene};
use nodeflow::state::StateManager;
use nodeflow::view::{CanvasInput, CanvasView, window_visibility};

const FIT_PADDING: f32 = 80.0;

fn main() -> iced::Result {
    init_tracing();

    iced::application(init, update, view)
        .title("Nodeflow")
        .subscription(subscription)
        .theme(theme)
        .antialiasing(true)
        .run()
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn theme(_state: &Nodeflow) -> Theme {
    Theme::Dark
}

#[derive(Debug, Clone)]
pub enum Message {
    Canvas(CanvasInput),
    Tick(Instant),
    Window(window::Id, window::Event),
    Minimized(Option<bool>),
    Search(String),
}

struct Nodeflow {
    engine: Result<CanvasEngine, String>,
    scale_factor: f32,
    search: String,
}

fn init() -> (Nodeflow, Task<Message>) {
    let engine = build_engine(EngineConfig::load())
        .or_else(|err| {
            warn!(%err, "configuration rejected, using defaults");
            build_engine(EngineConfig::default())
        })
        .map_err(|err| {
            error!(%err, "failed to start canvas engine");
            err.to_string()
        });
    (
        Nodeflow {
            engine,
            scale_factor: 1.0,
            search: String::new(),
        },
        Task::none(),
    )
}

fn build_engine(config: EngineConfig) -> Result<CanvasEngine, EngineError> {
    let mut engine = CanvasEngine::new(config)?;

    for kind in [EngineEventKind::LinkAdded, EngineEventKind::LinkRemoved] {
        engine.subscribe(kind, move |event| info!(event = kind.name(), ?event, "graph changed"))?;
    }
    engine.subscribe(EngineEventKind::NodeDoubleClicked, |event| {
        info!(?event, "node opened");
    })?;

    let restored = Scene::default_path()
        .map_err(EngineError::from)
        .and_then(|path| Scene::load_from(&path).map_err(EngineError::from))
        .and_then(|scene| engine.load_scene(scene));
    if let Err(err) = restored {
        info!(%err, "no saved scene, seeding demo graph");
        if let Err(err) = seed_demo(engine.state_mut()) {
            warn!(%err, "demo graph incomplete");
        }
    }

    engine.start();
    Ok(engine)
}

fn seed_demo(state: &mut StateManager) -> Result<(), GraphError> {
    state.add_node(
        Node::new("webhook", NodeKind::Webhook, Point::new(50.0, 60.0))
            .with_output("body", DataType::Object, "Body"),
    )?;
    state.add_node(
        Node::new("matrix", NodeKind::SmartMatrix, Point::new(340.0, 40.0))
            .with_input("in", DataType::Object, "In", true),
    )?;
    state.add_node(Node::new("test", NodeKind::Test, Point::new(340.0, 320.0)))?;
    state.add_node(
        Node::new("output", NodeKind::Output, Point::new(720.0, 180.0))
            .with_input("value", DataType::Any, "Value", true),
    )?;

    state.add_link(Link::new("webhook", "body", "matrix", "in"))?;
    state.add_link(Link::new("matrix", "output", "output", "value"))?;
    state.mark_clean();
    Ok(())
}

fn update(state: &mut Nodeflow, message: Message) -> Task<Message> {
    let Ok(engine) = &mut state.engine else {
        return Task::none();
    };
    match message {
        Message::Canvas(input) => {
            for input in input.into_inputs() {
                if let CanvasInput::KeyPressed { key, modifiers } = &input
                    && handle_shortcut(engine, key, *modifiers)
                {
                    continue;
                }
                input.apply(engine, state.scale_factor);
            }
        }
        Message::Tick(now) => {
            let _ = engine.tick(now);
        }
        Message::Window(id, event) => {
            if let window::Event::Rescaled(factor) = event {
                state.scale_factor = factor;
                let size = engine.camera().canvas_size();
                engine.resize(size.width, size.height, factor);
            }
            if let Some(visible) = window_visibility(&event) {
                engine.set_visible(visible);
            } else if matches!(event, window::Event::Unfocused) {
                return window::is_minimized(id).map(Message::Minimized);
            }
        }
        Message::Minimized(minimized) => {
            if let Some(minimized) = minimized {
                engine.set_visible(!minimized);
            }
        }
        Message::Search(query) => {
            match NodeMatcher::parse(&query) {
                Ok(_) if query.trim().is_empty() => engine.clear_selection(),
                Ok(matcher) => {
                    let _ = engine.select_matching(&matcher);
                }
                Err(err) => debug!(%err, "search pattern not ready"),
            }
            state.search = query;
        }
    }
    Task::none()
}

/// Host-level commands; returns true when the key was consumed.
fn handle_shortcut(engine: &mut CanvasEngine, key: &Key, modifiers: iced::keyboard::Modifiers) -> bool {
    match key.as_ref() {
        Key::Character("s") if modifiers.command() => {
            let saved = Scene::default_path()
                .and_then(|path| engine.snapshot().save_to(&path).map(|()| path));
            match saved {
                Ok(path) => {
                    engine.state_mut().mark_clean();
                    info!(path = %path.display(), "scene saved");
                }
                Err(err) => error!(%err, "failed to save scene"),
            }
            true
        }
        Key::Character("f") if engine.interaction().is_idle() => {
            engine.fit_to_content(FIT_PADDING);
            true
        }
        Key::Character("l") if engine.interaction().is_idle() => {
            if let Err(err) = engine.auto_layout() {
                warn!(%err, "auto layout failed");
            }
            true
        }
        Key::Character("g") if engine.interaction().is_idle() => {
            let next = match engine.grid_kind() {
                GridKind::Lines => GridKind::Dots,
                GridKind::Dots => GridKind::Lines,
            };
            engine.set_grid_kind(next);
            true
        }
        Key::Character("d") if !modifiers.command() => {
            engine.set_debug_mode(!engine.is_debug_mode());
            true
        }
        Key::Named(Named::Home) => {
            engine.camera_mut().reset();
            true
        }
        _ => false,
    }
}

fn view(state: &Nodeflow) -> Element<'_, Message> {
    match &state.engine {
        Ok(engine) => {
            let program = canvas(CanvasView::new(engine))
                .width(Length::Fill)
                .height(Length::Fill);
            let search = text_input("Search nodes, /regex", &state.search)
                .on_input(Message::Search)
                .padding(6);
            column![search, Element::from(program).map(Message::Canvas)].into()
        }
        Err(err) => center(text(format!("Canvas unavailable: {err}"))).into(),
    }
}

fn subscription(state: &Nodeflow) -> Subscription<Message> {
    let Ok(engine) = &state.engine else {
        return Subscription::none();
    };
    let windows = window::events().map(|(id, event)| Message::Window(id, event));
    if engine.is_running() && (engine.needs_redraw() || engine.is_animating()) {
        Subscription::batch([windows, window::frames().map(Message::Tick)])
    } else {
        windows
    }
}
