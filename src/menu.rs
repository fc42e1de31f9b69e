//! Dwell-driven menus
//!
//! A [`MenuController`] runs one list of entries: a scrolling window of rows,
//! each row backed by its own dwell region, with scroll bands just above and
//! below the window. Nested menus are handled by [`MenuStack`], which pushes a
//! new controller for a submenu and pops back to the suspended parent when the
//! submenu closes. Only the topmost controller receives pointer input.

use std::collections::BTreeMap;
use std::ops::Range;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::command::{DeviceAction, UpdateMethod};
use crate::dwell::{DwellRegion, DwellStatus};
use crate::geometry::{Bounds, Point};

#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    /// Dispatches an action and closes the menu
    Leaf(DeviceAction),
    /// Opens a nested menu
    Submenu(Vec<MenuEntry>),
    /// Closes the current submenu
    Back,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuEntry {
    pub label: String,
    pub kind: EntryKind,
}

impl MenuEntry {
    pub fn leaf(label: impl Into<String>, action: DeviceAction) -> Self {
        Self {
            label: label.into(),
            kind: EntryKind::Leaf(action),
        }
    }

    pub fn submenu(label: impl Into<String>, entries: Vec<MenuEntry>) -> Self {
        Self {
            label: label.into(),
            kind: EntryKind::Submenu(entries),
        }
    }

    pub fn back() -> Self {
        Self {
            label: "Back".to_string(),
            kind: EntryKind::Back,
        }
    }

    pub fn is_submenu(&self) -> bool {
        matches!(self.kind, EntryKind::Submenu(_))
    }
}

/// The device menu shown when the toggle region fires
pub fn default_menu() -> Vec<MenuEntry> {
    use DeviceAction::*;
    vec![
        MenuEntry::leaf("Night Vision", NightVisionOn),
        MenuEntry::leaf("Day Mode", NightVisionOff),
        MenuEntry::leaf("Capture Photo", CapturePhoto),
        MenuEntry::leaf("Start Recording", RecordStart),
        MenuEntry::leaf("Stop Recording", RecordStop),
        MenuEntry::submenu(
            "Brightness",
            vec![
                MenuEntry::leaf("Brighter", BrightnessUp),
                MenuEntry::leaf("Dimmer", BrightnessDown),
                MenuEntry::leaf("Auto Brightness", BrightnessAuto),
                MenuEntry::back(),
            ],
        ),
        MenuEntry::submenu(
            "Zoom",
            vec![
                MenuEntry::leaf("Zoom In", ZoomIn),
                MenuEntry::leaf("Zoom Out", ZoomOut),
                MenuEntry::leaf("Reset Zoom", ZoomReset),
                MenuEntry::back(),
            ],
        ),
        MenuEntry::submenu(
            "System",
            vec![
                MenuEntry::leaf("Battery Status", BatteryStatus),
                MenuEntry::leaf("Run Diagnostics", Diagnostics),
                MenuEntry::submenu(
                    "Firmware Update",
                    vec![
                        MenuEntry::leaf("Update via Wi-Fi", FirmwareUpdate(UpdateMethod::Wifi)),
                        MenuEntry::leaf("Update via USB", FirmwareUpdate(UpdateMethod::Usb)),
                        MenuEntry::back(),
                    ],
                ),
                MenuEntry::back(),
            ],
        ),
    ]
}

/// Screen placement of a menu's rows and scroll bands
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MenuLayout {
    /// Top-left corner of the first visible row
    pub origin: Point,
    pub row_width: f32,
    pub row_height: f32,
    /// Height of the scroll band above the first row and below the last
    pub edge_band: f32,
    pub visible_count: usize,
}

impl Default for MenuLayout {
    fn default() -> Self {
        Self {
            origin: Point::new(0.3, 0.25),
            row_width: 0.4,
            row_height: 0.12,
            edge_band: 0.08,
            visible_count: 4,
        }
    }
}

impl MenuLayout {
    pub fn row_bounds(&self, slot: usize) -> Bounds {
        Bounds::rect(
            self.origin.x,
            self.origin.y + slot as f32 * self.row_height,
            self.row_width,
            self.row_height,
        )
    }

    pub fn top_band(&self) -> Bounds {
        Bounds::rect(
            self.origin.x,
            self.origin.y - self.edge_band,
            self.row_width,
            self.edge_band,
        )
    }

    /// Band directly below `rows` stacked rows
    pub fn bottom_band(&self, rows: usize) -> Bounds {
        Bounds::rect(
            self.origin.x,
            self.origin.y + rows as f32 * self.row_height,
            self.row_width,
            self.edge_band,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Entries and scroll position of one menu level
#[derive(Debug, Clone)]
pub struct MenuState {
    pub open: bool,
    entries: Vec<MenuEntry>,
    scroll_offset: usize,
    visible_count: usize,
}

impl MenuState {
    pub fn new(entries: Vec<MenuEntry>, visible_count: usize) -> Self {
        Self {
            open: false,
            entries,
            scroll_offset: 0,
            visible_count: visible_count.max(1),
        }
    }

    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    pub fn max_offset(&self) -> usize {
        self.entries.len().saturating_sub(self.visible_count)
    }

    /// Entry indices currently on screen
    pub fn visible_range(&self) -> Range<usize> {
        let end = (self.scroll_offset + self.visible_count).min(self.entries.len());
        self.scroll_offset..end
    }

    /// Move the window one row, clamped; returns whether it moved
    fn step(&mut self, direction: ScrollDirection) -> bool {
        let next = match direction {
            ScrollDirection::Up => self.scroll_offset.saturating_sub(1),
            ScrollDirection::Down => (self.scroll_offset + 1).min(self.max_offset()),
        };
        let moved = next != self.scroll_offset;
        self.scroll_offset = next;
        moved
    }
}

/// What a controller wants done after a frame or a manual action
#[derive(Debug, Clone, PartialEq)]
pub enum MenuOutcome {
    None,
    Scrolled(ScrollDirection),
    Selected(DeviceAction),
    OpenSubmenu(Vec<MenuEntry>),
    Back,
}

/// Snapshot of one visible row for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub label: String,
    pub is_submenu: bool,
    pub bounds: Bounds,
    pub progress: f32,
}

/// Snapshot of the active menu for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct MenuView {
    pub depth: usize,
    pub scroll_offset: usize,
    pub total: usize,
    pub rows: Vec<RowView>,
    pub can_scroll_up: bool,
    pub can_scroll_down: bool,
    pub top_band: Bounds,
    pub bottom_band: Bounds,
}

pub struct MenuController {
    state: MenuState,
    layout: MenuLayout,
    row_threshold: Duration,
    scroll_interval: Duration,
    /// Dwell regions of the visible rows, keyed by entry index
    rows: BTreeMap<usize, DwellRegion>,
    last_scroll: Option<Instant>,
}

impl MenuController {
    pub fn new(
        entries: Vec<MenuEntry>,
        layout: MenuLayout,
        row_threshold: Duration,
        scroll_interval: Duration,
    ) -> Self {
        Self {
            state: MenuState::new(entries, layout.visible_count),
            layout,
            row_threshold,
            scroll_interval,
            rows: BTreeMap::new(),
            last_scroll: None,
        }
    }

    pub fn state(&self) -> &MenuState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.open
    }

    pub fn layout(&self) -> &MenuLayout {
        &self.layout
    }

    pub fn open(&mut self) {
        self.state.open = true;
        self.sync_rows();
    }

    /// Close and forget every row's dwell
    pub fn close(&mut self) {
        self.state.open = false;
        self.rows.clear();
        self.last_scroll = None;
    }

    /// Stop taking input while a child menu is on top; scroll and dwell state
    /// are kept as they are
    pub fn suspend(&mut self) {
        self.state.open = false;
    }

    /// Take input again after the child closed
    ///
    /// Partial dwells are dropped since the pointer may have been anywhere
    /// meanwhile. Spent rows stay latched, so the row that opened the child
    /// does not open it again while the pointer still rests on it.
    pub fn resume(&mut self) {
        self.state.open = true;
        for region in self.rows.values_mut() {
            region.cancel();
        }
    }

    pub fn visible_window(&self) -> Range<usize> {
        self.state.visible_range()
    }

    /// Edge-band scroll, limited to one step per scroll interval
    pub fn scroll_edge(&mut self, direction: ScrollDirection, now: Instant) -> bool {
        if let Some(last) = self.last_scroll {
            if now.saturating_duration_since(last) < self.scroll_interval {
                return false;
            }
        }
        if self.scroll(direction) {
            self.last_scroll = Some(now);
            true
        } else {
            false
        }
    }

    pub fn scroll_up(&mut self, now: Instant) -> bool {
        self.scroll_edge(ScrollDirection::Up, now)
    }

    pub fn scroll_down(&mut self, now: Instant) -> bool {
        self.scroll_edge(ScrollDirection::Down, now)
    }

    /// Unthrottled one-row scroll for the manual path
    pub fn scroll(&mut self, direction: ScrollDirection) -> bool {
        if !self.state.step(direction) {
            return false;
        }
        debug!(
            "Menu scrolled {:?} to offset {}",
            direction, self.state.scroll_offset
        );
        self.sync_rows();
        true
    }

    /// Keep exactly one dwell region per visible row
    ///
    /// Rows that left the window lose their region; rows that moved to a
    /// different slot start over.
    fn sync_rows(&mut self) {
        let range = self.state.visible_range();
        self.rows.retain(|index, _| range.contains(index));
        for (slot, index) in range.enumerate() {
            let bounds = self.layout.row_bounds(slot);
            let threshold = self.row_threshold;
            let label = &self.state.entries[index].label;
            self.rows
                .entry(index)
                .and_modify(|region| {
                    if region.bounds != bounds {
                        region.bounds = bounds;
                        region.reset();
                    }
                })
                .or_insert_with(|| DwellRegion::new(label.clone(), bounds, threshold));
        }
    }

    pub fn row_bounds(&self, slot: usize) -> Bounds {
        self.layout.row_bounds(slot)
    }

    /// Dwell progress of each visible row, top to bottom
    pub fn row_progress(&self, now: Instant) -> Vec<f32> {
        self.state
            .visible_range()
            .map(|index| self.rows.get(&index).map(|r| r.progress(now)).unwrap_or(0.0))
            .collect()
    }

    fn rows_shown(&self) -> usize {
        self.state.visible_range().len()
    }

    /// Advance the menu by one frame
    pub fn update(&mut self, point: Option<Point>, now: Instant) -> MenuOutcome {
        if !self.state.open {
            return MenuOutcome::None;
        }

        if let Some(p) = point {
            let direction = if self.layout.top_band().contains(p) {
                Some(ScrollDirection::Up)
            } else if self.layout.bottom_band(self.rows_shown()).contains(p) {
                Some(ScrollDirection::Down)
            } else {
                None
            };
            if let Some(direction) = direction {
                // The pointer is outside every row, so all rows re-arm
                for region in self.rows.values_mut() {
                    region.reset();
                }
                if self.scroll_edge(direction, now) {
                    return MenuOutcome::Scrolled(direction);
                }
                return MenuOutcome::None;
            }
        }

        let mut triggered = None;
        for (index, region) in self.rows.iter_mut() {
            if region.evaluate(point, now) == DwellStatus::Triggered && triggered.is_none() {
                triggered = Some(*index);
            }
        }

        match triggered {
            Some(index) => self.activate(index),
            None => MenuOutcome::None,
        }
    }

    /// Select the row in the given visible slot, as if it had been dwelt on
    pub fn select(&mut self, slot: usize) -> MenuOutcome {
        if !self.state.open {
            return MenuOutcome::None;
        }
        let index = self.state.scroll_offset + slot;
        if !self.state.visible_range().contains(&index) {
            return MenuOutcome::None;
        }
        self.activate(index)
    }

    fn activate(&mut self, index: usize) -> MenuOutcome {
        let entry = &self.state.entries[index];
        debug!("Menu entry {:?} selected", entry.label);
        match &entry.kind {
            EntryKind::Leaf(action) => {
                let action = *action;
                self.close();
                MenuOutcome::Selected(action)
            }
            EntryKind::Submenu(children) => MenuOutcome::OpenSubmenu(children.clone()),
            EntryKind::Back => MenuOutcome::Back,
        }
    }

    pub fn view(&self, depth: usize, now: Instant) -> MenuView {
        let rows = self
            .state
            .visible_range()
            .enumerate()
            .map(|(slot, index)| {
                let entry = &self.state.entries[index];
                RowView {
                    label: entry.label.clone(),
                    is_submenu: entry.is_submenu(),
                    bounds: self.layout.row_bounds(slot),
                    progress: self.rows.get(&index).map(|r| r.progress(now)).unwrap_or(0.0),
                }
            })
            .collect::<Vec<_>>();
        MenuView {
            depth,
            scroll_offset: self.state.scroll_offset,
            total: self.state.entries.len(),
            can_scroll_up: self.state.scroll_offset > 0,
            can_scroll_down: self.state.scroll_offset < self.state.max_offset(),
            top_band: self.layout.top_band(),
            bottom_band: self.layout.bottom_band(rows.len()),
            rows,
        }
    }
}

/// Change to the menu stack reported back to the frame loop
#[derive(Debug, Clone, PartialEq)]
pub enum MenuEvent {
    None,
    Opened,
    Closed,
    Scrolled(ScrollDirection),
    EnteredSubmenu,
    LeftSubmenu,
    Selected(DeviceAction),
}

/// Stack of open menus, root at the bottom
///
/// An empty stack means the menu is closed. Only the top frame is open; the
/// frames below it are suspended with their scroll position intact.
pub struct MenuStack {
    root: Vec<MenuEntry>,
    layout: MenuLayout,
    row_threshold: Duration,
    scroll_interval: Duration,
    frames: Vec<MenuController>,
}

impl MenuStack {
    pub fn new(
        root: Vec<MenuEntry>,
        layout: MenuLayout,
        row_threshold: Duration,
        scroll_interval: Duration,
    ) -> Self {
        Self {
            root,
            layout,
            row_threshold,
            scroll_interval,
            frames: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<&MenuController> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut MenuController> {
        self.frames.last_mut()
    }

    pub fn root_entries(&self) -> &[MenuEntry] {
        &self.root
    }

    /// Toggle-region trigger: open the root menu, or close the topmost frame
    pub fn toggle(&mut self) -> MenuEvent {
        if self.frames.is_empty() {
            let mut root = self.controller(self.root.clone());
            root.open();
            self.frames.push(root);
            MenuEvent::Opened
        } else {
            self.pop()
        }
    }

    pub fn push_submenu(&mut self, entries: Vec<MenuEntry>) -> MenuEvent {
        if let Some(parent) = self.frames.last_mut() {
            parent.suspend();
        }
        let mut child = self.controller(entries);
        child.open();
        self.frames.push(child);
        MenuEvent::EnteredSubmenu
    }

    /// Close the top frame and resume its parent
    pub fn pop(&mut self) -> MenuEvent {
        let Some(mut top) = self.frames.pop() else {
            return MenuEvent::None;
        };
        top.close();
        match self.frames.last_mut() {
            Some(parent) => {
                parent.resume();
                MenuEvent::LeftSubmenu
            }
            None => MenuEvent::Closed,
        }
    }

    pub fn close_all(&mut self) -> MenuEvent {
        if self.frames.is_empty() {
            return MenuEvent::None;
        }
        for frame in self.frames.iter_mut() {
            frame.close();
        }
        self.frames.clear();
        MenuEvent::Closed
    }

    /// Feed the pointer to the top frame
    pub fn update(&mut self, point: Option<Point>, now: Instant) -> MenuEvent {
        let outcome = match self.frames.last_mut() {
            Some(top) => top.update(point, now),
            None => return MenuEvent::None,
        };
        self.apply(outcome)
    }

    /// Manual selection of a visible slot in the top frame
    pub fn select(&mut self, slot: usize) -> MenuEvent {
        let outcome = match self.frames.last_mut() {
            Some(top) => top.select(slot),
            None => return MenuEvent::None,
        };
        self.apply(outcome)
    }

    /// Manual scroll of the top frame
    pub fn scroll(&mut self, direction: ScrollDirection) -> MenuEvent {
        match self.frames.last_mut() {
            Some(top) => {
                if top.scroll(direction) {
                    MenuEvent::Scrolled(direction)
                } else {
                    MenuEvent::None
                }
            }
            None => MenuEvent::None,
        }
    }

    fn apply(&mut self, outcome: MenuOutcome) -> MenuEvent {
        match outcome {
            MenuOutcome::None => MenuEvent::None,
            MenuOutcome::Scrolled(direction) => MenuEvent::Scrolled(direction),
            MenuOutcome::Selected(action) => {
                self.close_all();
                MenuEvent::Selected(action)
            }
            MenuOutcome::OpenSubmenu(entries) => self.push_submenu(entries),
            MenuOutcome::Back => self.pop(),
        }
    }

    pub fn view(&self, now: Instant) -> Option<MenuView> {
        self.frames.last().map(|top| top.view(self.frames.len(), now))
    }

    fn controller(&self, entries: Vec<MenuEntry>) -> MenuController {
        MenuController::new(entries, self.layout, self.row_threshold, self.scroll_interval)
    }
}
