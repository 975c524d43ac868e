//! iced canvas adapter over a [`CanvasEngine`].
//!
//! The program never mutates the engine. It translates widget events into
//! [`CanvasInput`] messages for the host's `update`, and replays the
//! engine's layers into cached geometry, one cache per layer.

use iced::keyboard::{self, Key, Modifiers};
use iced::mouse;
use iced::widget::canvas::{self, Cache, Geometry};
use iced::{Point, Rectangle, Size, window};
use std::cell::Cell;

use crate::engine::{CanvasEngine, LayerKind};
use crate::interaction::Gesture;
use crate::render::iced_surface::FrameSurface;

/// Pixels per wheel "line".
const LINE_HEIGHT: f32 = 100.0;

#[derive(Debug, Clone)]
pub enum CanvasInput {
    Resized(Size),
    PointerDown {
        position: Point,
        button: mouse::Button,
        modifiers: Modifiers,
    },
    PointerMoved(Point),
    PointerUp {
        position: Point,
        button: mouse::Button,
    },
    PointerLeft,
    Wheel {
        position: Point,
        delta: f32,
    },
    KeyPressed {
        key: Key,
        modifiers: Modifiers,
    },
    ModifiersChanged(Modifiers),
    /// Several inputs produced by one widget event, in order.
    Batch(Vec<CanvasInput>),
}

impl CanvasInput {
    /// Flatten nested batches into a list of single inputs.
    pub fn into_inputs(self) -> Vec<CanvasInput> {
        match self {
            CanvasInput::Batch(inputs) => inputs.into_iter().flat_map(CanvasInput::into_inputs).collect(),
            input => vec![input],
        }
    }

    /// Feed this input to the engine.
    pub fn apply(self, engine: &mut CanvasEngine, scale_factor: f32) {
        match self {
            CanvasInput::Batch(inputs) => {
                for input in inputs {
                    input.apply(engine, scale_factor);
                }
            }
            CanvasInput::Resized(size) => engine.resize(size.width, size.height, scale_factor),
            CanvasInput::PointerDown {
                position,
                button,
                modifiers,
            } => engine.pointer_down(position, button, modifiers),
            CanvasInput::PointerMoved(position) => engine.pointer_move(position),
            CanvasInput::PointerUp { position, button } => engine.pointer_up(position, button),
            CanvasInput::PointerLeft => engine.pointer_leave(),
            CanvasInput::Wheel { position, delta } => engine.wheel(position, delta),
            CanvasInput::KeyPressed { key, modifiers } => engine.key_down(&key, modifiers),
            CanvasInput::ModifiersChanged(modifiers) => engine.modifiers_changed(modifiers),
        }
    }
}

/// Widget-local state: one geometry cache per layer.
pub struct ViewState {
    caches: [Cache; 3],
    seen: [Cell<u64>; 3],
    size: Size,
    inside: bool,
    last_position: Point,
    modifiers: Modifiers,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            caches: [Cache::new(), Cache::new(), Cache::new()],
            seen: [Cell::new(0), Cell::new(0), Cell::new(0)],
            size: Size::ZERO,
            inside: false,
            last_position: Point::ORIGIN,
            modifiers: Modifiers::default(),
        }
    }
}

impl ViewState {
    /// Turn a widget event into engine input. A size change is reported
    /// ahead of the event that revealed it.
    pub fn translate(
        &mut self,
        event: &iced::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<CanvasInput> {
        let resized = (bounds.size() != self.size).then(|| {
            self.size = bounds.size();
            CanvasInput::Resized(self.size)
        });
        let input = self.input(event, bounds, cursor);
        match (resized, input) {
            (Some(resized), Some(input)) => Some(CanvasInput::Batch(vec![resized, input])),
            (resized, input) => resized.or(input),
        }
    }

    fn input(&mut self, event: &iced::Event, bounds: Rectangle, cursor: mouse::Cursor) -> Option<CanvasInput> {
        let input = match event {
            iced::Event::Mouse(mouse_event) => match mouse_event {
                mouse::Event::ButtonPressed(button) => {
                    let position = cursor.position_in(bounds)?;
                    self.last_position = position;
                    CanvasInput::PointerDown {
                        position,
                        button: *button,
                        modifiers: self.modifiers,
                    }
                }
                mouse::Event::ButtonReleased(button) => CanvasInput::PointerUp {
                    position: cursor.position_in(bounds).unwrap_or(self.last_position),
                    button: *button,
                },
                mouse::Event::CursorMoved { .. } => match cursor.position_in(bounds) {
                    Some(position) => {
                        self.inside = true;
                        self.last_position = position;
                        CanvasInput::PointerMoved(position)
                    }
                    None if self.inside => {
                        self.inside = false;
                        CanvasInput::PointerLeft
                    }
                    None => return None,
                },
                mouse::Event::CursorLeft => {
                    self.inside = false;
                    CanvasInput::PointerLeft
                }
                mouse::Event::WheelScrolled { delta } => {
                    let position = cursor.position_in(bounds)?;
                    let delta = match delta {
                        mouse::ScrollDelta::Lines { y, .. } => -*y * LINE_HEIGHT,
                        mouse::ScrollDelta::Pixels { y, .. } => -*y,
                    };
                    CanvasInput::Wheel { position, delta }
                }
                _ => return None,
            },
            // Keys typed elsewhere in the window belong to other widgets.
            iced::Event::Keyboard(keyboard::Event::KeyPressed { key, modifiers, .. }) => {
                self.modifiers = *modifiers;
                if !self.inside {
                    return None;
                }
                CanvasInput::KeyPressed {
                    key: key.clone(),
                    modifiers: *modifiers,
                }
            }
            iced::Event::Keyboard(keyboard::Event::ModifiersChanged(modifiers)) => {
                self.modifiers = *modifiers;
                CanvasInput::ModifiersChanged(*modifiers)
            }
            _ => return None,
        };
        Some(input)
    }
}

/// Whether a window event tells us the canvas is on screen. `None` when the
/// event says nothing about it.
pub fn window_visibility(event: &window::Event) -> Option<bool> {
    match event {
        window::Event::Resized(size) => Some(size.width > 0.0 && size.height > 0.0),
        window::Event::Focused => Some(true),
        _ => None,
    }
}

const LAYERS: [LayerKind; 3] = [LayerKind::Background, LayerKind::Connections, LayerKind::Nodes];

pub struct CanvasView<'a> {
    engine: &'a CanvasEngine,
}

impl<'a> CanvasView<'a> {
    pub fn new(engine: &'a CanvasEngine) -> Self {
        Self { engine }
    }
}

impl canvas::Program<CanvasInput> for CanvasView<'_> {
    type State = ViewState;

    fn draw(
        &self,
        state: &Self::State,
        renderer: &iced::Renderer,
        _theme: &iced::Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        LAYERS
            .iter()
            .zip(state.caches.iter().zip(state.seen.iter()))
            .map(|(kind, (cache, seen))| {
                let layer = self.engine.layer(*kind);
                if seen.get() != layer.generation() {
                    cache.clear();
                    seen.set(layer.generation());
                }
                cache.draw(renderer, bounds.size(), |frame| {
                    let mut surface = FrameSurface::new(frame);
                    layer.commands().replay(&mut surface);
                })
            })
            .collect()
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: &iced::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<CanvasInput>> {
        state.translate(event, bounds, cursor).map(canvas::Action::publish)
    }

    fn mouse_interaction(
        &self,
        _state: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if !cursor.is_over(bounds) {
            return mouse::Interaction::default();
        }
        let interaction = self.engine.interaction();
        match interaction.gesture() {
            Gesture::DraggingNodes { .. } | Gesture::Panning { .. } => mouse::Interaction::Grabbing,
            Gesture::Connecting { .. } | Gesture::BoxSelecting { .. } => mouse::Interaction::Crosshair,
            Gesture::Idle => {
                if interaction.hovered_port().is_some() {
                    mouse::Interaction::Crosshair
                } else if interaction.hovered_node().is_some() {
                    mouse::Interaction::Grab
                } else if interaction.hovered_link().is_some() {
                    mouse::Interaction::Pointer
                } else {
                    mouse::Interaction::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(width: f32, height: f32) -> Rectangle {
        Rectangle::new(Point::ORIGIN, Size::new(width, height))
    }

    #[test]
    fn resize_keeps_the_event_that_revealed_it() {
        let mut state = ViewState::default();
        let cursor = mouse::Cursor::Available(Point::new(40.0, 30.0));
        let release = iced::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left));

        let input = state.translate(&release, bounds(800.0, 600.0), cursor).unwrap();
        let inputs = input.into_inputs();
        assert_eq!(inputs.len(), 2);
        assert!(matches!(inputs[0], CanvasInput::Resized(size) if size == Size::new(800.0, 600.0)));
        assert!(matches!(
            inputs[1],
            CanvasInput::PointerUp { position, button: mouse::Button::Left } if position == Point::new(40.0, 30.0)
        ));

        let again = state.translate(&release, bounds(800.0, 600.0), cursor);
        assert!(matches!(again, Some(CanvasInput::PointerUp { .. })));
    }

    #[test]
    fn resize_alone_is_not_batched() {
        let mut state = ViewState::default();
        let ignored = iced::Event::Mouse(mouse::Event::CursorEntered);
        let input = state.translate(&ignored, bounds(320.0, 200.0), mouse::Cursor::Unavailable);
        assert!(matches!(input, Some(CanvasInput::Resized(_))));
        assert!(state.translate(&ignored, bounds(320.0, 200.0), mouse::Cursor::Unavailable).is_none());
    }

    #[test]
    fn minimised_windows_hide_the_canvas() {
        assert_eq!(window_visibility(&window::Event::Resized(Size::ZERO)), Some(false));
        assert_eq!(window_visibility(&window::Event::Resized(Size::new(800.0, 600.0))), Some(true));
        assert_eq!(window_visibility(&window::Event::Focused), Some(true));
        assert_eq!(window_visibility(&window::Event::Unfocused), None);
    }
}
