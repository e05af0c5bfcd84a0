//! Field-by-field change detection between two snapshots.
//!
//! Fields are walked from a fixed descriptor table in declaration order.
//! Rows are compared index by index; a row that was never populated in the
//! previous snapshot reports every non-zero entry of the new one as a first
//! appearance (`old == None`).

use std::fmt;

use tracing::debug;

use crate::controls::{DeviceState, Field, ROW_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int(i32),
}

impl Value {
    pub fn is_zero(self) -> bool {
        matches!(self, Value::Bool(false) | Value::Byte(0) | Value::Int(0))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Row,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub field: Field,
    pub shape: Shape,
}

const fn scalar(field: Field) -> FieldDescriptor {
    FieldDescriptor {
        field,
        shape: Shape::Scalar,
    }
}

const fn row(field: Field) -> FieldDescriptor {
    FieldDescriptor {
        field,
        shape: Shape::Row,
    }
}

/// Every field of [`DeviceState`], in the order changes are reported.
pub const FIELDS: [FieldDescriptor; 45] = [
    row(Field::TopRowButtons),
    row(Field::BottomRowTouched),
    row(Field::BottomRowPitch),
    scalar(Field::SelectorTouched),
    scalar(Field::SelectorPressed),
    scalar(Field::SelectorPitch),
    scalar(Field::SelectorLeft),
    scalar(Field::SelectorTop),
    scalar(Field::SelectorBottom),
    scalar(Field::SelectorRight),
    scalar(Field::M),
    scalar(Field::S),
    scalar(Field::Shift),
    scalar(Field::Scale),
    scalar(Field::Arp),
    scalar(Field::Undo),
    scalar(Field::Quantize),
    scalar(Field::Auto),
    scalar(Field::Scene),
    scalar(Field::Pattern),
    scalar(Field::Track),
    scalar(Field::KeyMode),
    scalar(Field::Clear),
    scalar(Field::PresetUp),
    scalar(Field::PresetDown),
    scalar(Field::Left),
    scalar(Field::Right),
    scalar(Field::Loop),
    scalar(Field::Metro),
    scalar(Field::Tempo),
    scalar(Field::Play),
    scalar(Field::Rec),
    scalar(Field::Stop),
    scalar(Field::Browser),
    scalar(Field::PlugIn),
    scalar(Field::Mixer),
    scalar(Field::Instance),
    scalar(Field::Midi),
    scalar(Field::Setup),
    scalar(Field::FixedVel),
    scalar(Field::OctaveDecrease),
    scalar(Field::OctaveIncrease),
    scalar(Field::LeftWheelPitch),
    scalar(Field::StripValue),
    scalar(Field::RightWheelPitch),
];

/// One detected transition. `index` is 0 for scalar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub field: Field,
    pub index: usize,
    pub old: Option<Value>,
    pub new: Value,
}

impl ChangeEvent {
    pub fn is_press(&self) -> bool {
        self.new == Value::Bool(true)
    }

    pub fn is_release(&self) -> bool {
        self.new == Value::Bool(false)
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field)?;
        if matches!(field_shape(self.field), Shape::Row) {
            write!(f, "[{}]", self.index)?;
        }
        match self.old {
            Some(old) => write!(f, ": {old} -> {}", self.new),
            None => write!(f, ": new: {}", self.new),
        }
    }
}

/// Receiver of change events.
pub trait ChangeHandler {
    fn on_change(&mut self, event: &ChangeEvent);
}

impl<H: ChangeHandler + ?Sized> ChangeHandler for &mut H {
    fn on_change(&mut self, event: &ChangeEvent) {
        (**self).on_change(event);
    }
}

/// Delivers every event to both handlers, first `A` then `B`.
impl<A: ChangeHandler, B: ChangeHandler> ChangeHandler for (A, B) {
    fn on_change(&mut self, event: &ChangeEvent) {
        self.0.on_change(event);
        self.1.on_change(event);
    }
}

/// Logs every change at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeLog;

impl ChangeHandler for ChangeLog {
    fn on_change(&mut self, event: &ChangeEvent) {
        debug!("{event}");
    }
}

fn field_shape(field: Field) -> Shape {
    FIELDS
        .iter()
        .find(|d| d.field == field)
        .map_or(Shape::Scalar, |d| d.shape)
}

fn read_scalar(state: &DeviceState, field: Field) -> Option<Value> {
    match field {
        Field::SelectorPitch => Some(Value::Byte(state.selector.pitch)),
        Field::LeftWheelPitch => Some(Value::Byte(state.wheels.left_pitch)),
        Field::StripValue => Some(Value::Byte(state.wheels.strip)),
        Field::RightWheelPitch => Some(Value::Int(state.wheels.right_pitch)),
        flag => state.flag(flag).map(Value::Bool),
    }
}

fn read_row(state: &DeviceState, field: Field) -> Option<[Value; ROW_LEN]> {
    match field {
        Field::TopRowButtons => state.top_row_buttons.map(|r| r.map(Value::Bool)),
        Field::BottomRowTouched => state.bottom_row_touched.map(|r| r.map(Value::Bool)),
        Field::BottomRowPitch => state
            .bottom_row_pitch
            .map(|r| r.map(|p| Value::Int(i32::from(p)))),
        _ => None,
    }
}

/// Reports every difference between `previous` and `next` to `handler`,
/// synchronously and in field-then-index order.
pub fn diff<H: ChangeHandler + ?Sized>(
    previous: &DeviceState,
    next: &DeviceState,
    handler: &mut H,
) {
    for FieldDescriptor { field, shape } in FIELDS {
        match shape {
            Shape::Scalar => {
                let (Some(old), Some(new)) =
                    (read_scalar(previous, field), read_scalar(next, field))
                else {
                    continue;
                };
                if old != new {
                    handler.on_change(&ChangeEvent {
                        field,
                        index: 0,
                        old: Some(old),
                        new,
                    });
                }
            }
            Shape::Row => {
                let Some(new_row) = read_row(next, field) else {
                    continue;
                };
                match read_row(previous, field) {
                    None => {
                        for (index, new) in new_row.into_iter().enumerate() {
                            if !new.is_zero() {
                                handler.on_change(&ChangeEvent {
                                    field,
                                    index,
                                    old: None,
                                    new,
                                });
                            }
                        }
                    }
                    Some(old_row) => {
                        for (index, (old, new)) in old_row.into_iter().zip(new_row).enumerate() {
                            if old != new {
                                handler.on_change(&ChangeEvent {
                                    field,
                                    index,
                                    old: Some(old),
                                    new,
                                });
                            }
                        }
                    }
                }
            }
        }
    }
}
