//! Context stack tracker
//!
//! Attributes every structural event to its logically enclosing ship or
//! station while holding only the active ancestry path: one entry per open
//! element, one frame per open component and per open module.

use super::attributes::Attributes;
use super::builder::{apply_source, begin_ship, build_blueprint, ModuleDraft, StationDraft};
use super::model::{BlueprintRecord, ModuleOrigin, ShipRecord, StationRecord};
use crate::stats::StatsLookup;

/// Classification of a `component` element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Ship,
    Station,
    Sector,
    Zone,
    Other,
}

impl ComponentKind {
    /// An explicit `class` decides; the macro name is only consulted when no class is given
    pub fn of(attrs: &Attributes) -> Self {
        if let Some(class) = attrs.get("class") {
            let class = class.to_ascii_lowercase();
            return match class.as_str() {
                "ship" => ComponentKind::Ship,
                c if c.starts_with("ship_") => ComponentKind::Ship,
                "station" => ComponentKind::Station,
                "sector" => ComponentKind::Sector,
                "zone" => ComponentKind::Zone,
                _ => ComponentKind::Other,
            };
        }
        let macro_name = attrs.get("macro").unwrap_or_default().to_ascii_lowercase();
        if macro_name.contains("ship") {
            ComponentKind::Ship
        } else if macro_name.contains("station") {
            ComponentKind::Station
        } else {
            ComponentKind::Other
        }
    }
}

/// Closed set of element kinds the tracker reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Info,
    Player,
    Component(ComponentKind),
    Module,
    Entry,
    Workforce,
    Offset,
    Rotation,
    Connection,
    Ware,
    Blueprint,
    Sector,
    Zone,
    Source,
    Construction,
    Sequence,
    Other,
}

impl ElementKind {
    pub fn classify(name: &str, attrs: &Attributes, parent: Option<&str>) -> Self {
        match name {
            "info" => ElementKind::Info,
            "player" => ElementKind::Player,
            "component" => ElementKind::Component(ComponentKind::of(attrs)),
            "module" => ElementKind::Module,
            "entry" => ElementKind::Entry,
            "workforce" => ElementKind::Workforce,
            "offset" => ElementKind::Offset,
            "position" if parent == Some("offset") => ElementKind::Offset,
            "rotation" => ElementKind::Rotation,
            "connection" => ElementKind::Connection,
            "ware" if matches!(parent, Some("cargo" | "storage" | "supply")) => ElementKind::Ware,
            "blueprint" => ElementKind::Blueprint,
            "sector" => ElementKind::Sector,
            "zone" => ElementKind::Zone,
            "source" => ElementKind::Source,
            "construction" => ElementKind::Construction,
            "sequence" => ElementKind::Sequence,
            _ => ElementKind::Other,
        }
    }
}

/// Something the tracker hands back to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum Emitted {
    Info(Attributes),
    Player(Attributes),
    Ship(ShipRecord),
    Station(StationRecord),
    Blueprint(BlueprintRecord),
}

#[derive(Debug)]
enum Frame {
    Ship(ShipRecord),
    Station(StationDraft),
    Other,
}

#[derive(Debug)]
struct ModuleFrame {
    tag: String,
    station: usize,
    draft: ModuleDraft,
}

/// Stack effects of one open element, undone when it closes
#[derive(Debug, Default, Clone, Copy)]
struct Effects {
    component: bool,
    module: bool,
    sector: bool,
    zone: bool,
    construction: bool,
    sequence: bool,
}

#[derive(Debug)]
struct OpenTag {
    name: String,
    effects: Effects,
}

#[derive(Debug, Default)]
pub struct ContextTracker {
    tags: Vec<OpenTag>,
    components: Vec<Frame>,
    modules: Vec<ModuleFrame>,
    sectors: Vec<String>,
    zones: Vec<String>,
    current_station: Option<usize>,
    construction_depth: usize,
    sequence_depth: usize,
    max_depth: usize,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.tags.len()
    }

    /// Deepest nesting seen so far
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn open(&mut self, name: &str, attrs: Attributes) -> Option<Emitted> {
        let parent = self.tags.last().map(|t| t.name.as_str());
        let kind = ElementKind::classify(name, &attrs, parent);
        let mut effects = Effects::default();

        let emitted = match kind {
            ElementKind::Info => Some(Emitted::Info(attrs)),
            ElementKind::Player => Some(Emitted::Player(attrs)),
            ElementKind::Blueprint => Some(Emitted::Blueprint(build_blueprint(&attrs))),
            ElementKind::Component(component) => {
                effects.component = true;
                self.open_component(component, &attrs, &mut effects);
                None
            }
            ElementKind::Module => {
                effects.module = self.open_module(name, &attrs, ModuleOrigin::Module);
                None
            }
            ElementKind::Entry => {
                if self.in_build_sequence() && attrs.get("macro").is_some() {
                    effects.module = self.open_module(name, &attrs, ModuleOrigin::Construction);
                }
                None
            }
            ElementKind::Workforce
            | ElementKind::Offset
            | ElementKind::Rotation
            | ElementKind::Connection
            | ElementKind::Ware => {
                self.capture(kind, &attrs);
                None
            }
            ElementKind::Sector => {
                effects.sector = push_scope(&mut self.sectors, &attrs);
                None
            }
            ElementKind::Zone => {
                effects.zone = push_scope(&mut self.zones, &attrs);
                None
            }
            ElementKind::Source => {
                if let Some(ship) = self.owning_ship() {
                    apply_source(ship, &attrs);
                }
                None
            }
            ElementKind::Construction => {
                if self.owning_station().is_some() {
                    self.construction_depth += 1;
                    effects.construction = true;
                }
                None
            }
            ElementKind::Sequence => {
                if self.owning_station().is_some() {
                    self.sequence_depth += 1;
                    effects.sequence = true;
                }
                None
            }
            ElementKind::Other => None,
        };

        self.tags.push(OpenTag {
            name: name.to_string(),
            effects,
        });
        self.max_depth = self.max_depth.max(self.tags.len());
        emitted
    }

    pub fn close<S: StatsLookup + ?Sized>(&mut self, name: &str, stats: &mut S) -> Option<Emitted> {
        let tag = self.tags.pop()?;
        debug_assert_eq!(tag.name, name);
        let effects = tag.effects;

        if effects.module {
            self.close_module(name, stats);
        }
        if effects.construction {
            self.construction_depth = self.construction_depth.saturating_sub(1);
        }
        if effects.sequence {
            self.sequence_depth = self.sequence_depth.saturating_sub(1);
        }
        if effects.sector {
            self.sectors.pop();
        }
        if effects.zone {
            self.zones.pop();
        }
        if effects.component {
            return self.close_component();
        }
        None
    }

    fn enclosing_sector(&self) -> Option<&str> {
        self.sectors
            .last()
            .or_else(|| self.zones.last())
            .map(String::as_str)
    }

    fn open_component(&mut self, kind: ComponentKind, attrs: &Attributes, effects: &mut Effects) {
        let frame = match kind {
            ComponentKind::Ship if self.modules.is_empty() => {
                Frame::Ship(begin_ship(attrs, self.enclosing_sector()))
            }
            ComponentKind::Station => {
                let draft = StationDraft::begin(attrs, self.enclosing_sector());
                self.current_station = Some(self.components.len());
                self.construction_depth = 0;
                self.sequence_depth = 0;
                Frame::Station(draft)
            }
            ComponentKind::Sector => {
                effects.sector = push_scope(&mut self.sectors, attrs);
                Frame::Other
            }
            ComponentKind::Zone => {
                effects.zone = push_scope(&mut self.zones, attrs);
                Frame::Other
            }
            _ => Frame::Other,
        };
        self.components.push(frame);
    }

    fn close_component(&mut self) -> Option<Emitted> {
        let frame = self.components.pop()?;
        let index = self.components.len();
        match frame {
            Frame::Ship(ship) => Some(Emitted::Ship(ship)),
            Frame::Station(draft) => {
                self.modules.retain(|m| m.station < index);
                self.current_station = self
                    .components
                    .iter()
                    .rposition(|f| matches!(f, Frame::Station(_)));
                self.construction_depth = 0;
                self.sequence_depth = 0;
                Some(Emitted::Station(draft.finish()))
            }
            Frame::Other => None,
        }
    }

    /// Index of the station owning the current position, unless a ship sits in between
    fn owning_station_index(&self) -> Option<usize> {
        let index = self.current_station?;
        let ship_between = self.components[index + 1..]
            .iter()
            .any(|f| matches!(f, Frame::Ship(_)));
        (!ship_between).then_some(index)
    }

    fn owning_station(&mut self) -> Option<&mut StationDraft> {
        let index = self.owning_station_index()?;
        match self.components.get_mut(index) {
            Some(Frame::Station(draft)) => Some(draft),
            _ => None,
        }
    }

    fn owning_ship(&mut self) -> Option<&mut ShipRecord> {
        self.components
            .iter_mut()
            .rev()
            .find(|f| !matches!(f, Frame::Other))
            .and_then(|f| match f {
                Frame::Ship(ship) => Some(ship),
                _ => None,
            })
    }

    fn in_build_sequence(&self) -> bool {
        self.construction_depth > 0
            && self.sequence_depth > 0
            && self.owning_station_index().is_some()
    }

    /// Push a module frame bound to the owning station; returns whether one was pushed
    fn open_module(&mut self, tag: &str, attrs: &Attributes, origin: ModuleOrigin) -> bool {
        let Some(station) = self.owning_station_index() else {
            return false;
        };
        self.modules.push(ModuleFrame {
            tag: tag.to_string(),
            station,
            draft: ModuleDraft::begin(attrs, origin),
        });
        true
    }

    fn close_module<S: StatsLookup + ?Sized>(&mut self, tag: &str, stats: &mut S) {
        let Some(position) = self.modules.iter().rposition(|m| m.tag == tag) else {
            return;
        };
        let frame = self.modules.remove(position);
        let resolved = stats.lookup(frame.draft.macro_name());
        let (record, contribution) = frame.draft.finish(resolved.as_deref());
        if let Some(Frame::Station(station)) = self.components.get_mut(frame.station) {
            station.absorb_module(record, contribution);
        }
    }

    /// Route tag-specific attributes to the innermost module, else the owning station
    fn capture(&mut self, kind: ElementKind, attrs: &Attributes) {
        if self.owning_station_index().is_none() {
            return;
        }
        if let Some(module) = self.modules.last_mut() {
            let draft = &mut module.draft;
            match kind {
                ElementKind::Workforce => draft.capture_workforce(attrs),
                ElementKind::Offset => draft.capture_offset(attrs),
                ElementKind::Rotation => draft.capture_rotation(attrs),
                ElementKind::Connection => draft.capture_connection(attrs),
                ElementKind::Ware => draft.capture_ware(attrs),
                _ => {}
            }
            return;
        }
        if let Some(station) = self.owning_station() {
            match kind {
                ElementKind::Workforce => station.capture_workforce(attrs),
                ElementKind::Offset => station.capture_offset(attrs),
                ElementKind::Rotation => station.capture_rotation(attrs),
                ElementKind::Connection => station.capture_connection(attrs),
                ElementKind::Ware => station.capture_ware(attrs),
                _ => {}
            }
        }
    }
}

/// Open a named sector/zone scope; unnamed scopes are not tracked
fn push_scope(scopes: &mut Vec<String>, attrs: &Attributes) -> bool {
    match attrs.first_of(&["name", "macro", "id"]) {
        Some(name) => {
            scopes.push(name.to_string());
            true
        }
        None => false,
    }
}
