use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Forward,
    Backward,
    Left,
    Right,
    Jump,
    BarrelLeft,
    BarrelRight,
    Boost,
}

impl Key {
    pub const ALL: [Key; 8] = [
        Key::Forward,
        Key::Backward,
        Key::Left,
        Key::Right,
        Key::Jump,
        Key::BarrelLeft,
        Key::BarrelRight,
        Key::Boost,
    ];
}

/// Logical key state for one tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub barrel_left: bool,
    pub barrel_right: bool,
    pub boost: bool,
}

impl InputState {
    pub fn get(&self, key: Key) -> bool {
        match key {
            Key::Forward => self.forward,
            Key::Backward => self.backward,
            Key::Left => self.left,
            Key::Right => self.right,
            Key::Jump => self.jump,
            Key::BarrelLeft => self.barrel_left,
            Key::BarrelRight => self.barrel_right,
            Key::Boost => self.boost,
        }
    }

    pub fn set(&mut self, key: Key, pressed: bool) {
        let slot = match key {
            Key::Forward => &mut self.forward,
            Key::Backward => &mut self.backward,
            Key::Left => &mut self.left,
            Key::Right => &mut self.right,
            Key::Jump => &mut self.jump,
            Key::BarrelLeft => &mut self.barrel_left,
            Key::BarrelRight => &mut self.barrel_right,
            Key::Boost => &mut self.boost,
        };
        *slot = pressed;
    }

    pub fn with(mut self, key: Key) -> Self {
        self.set(key, true);
        self
    }
}

/// Physical key code → logical key.
#[derive(Debug, Clone)]
pub struct KeyMap {
    bindings: HashMap<String, Key>,
}

impl Default for KeyMap {
    fn default() -> Self {
        let mut map = KeyMap {
            bindings: HashMap::new(),
        };
        map.bind(Key::Forward, &["KeyW", "ArrowUp"]);
        map.bind(Key::Backward, &["KeyS", "ArrowDown"]);
        map.bind(Key::Left, &["KeyA", "ArrowLeft"]);
        map.bind(Key::Right, &["KeyD", "ArrowRight"]);
        map.bind(Key::Jump, &["Space"]);
        map.bind(Key::BarrelLeft, &["KeyQ"]);
        map.bind(Key::BarrelRight, &["KeyE"]);
        map.bind(Key::Boost, &["ShiftLeft", "ShiftRight"]);
        map
    }
}

impl KeyMap {
    pub fn bind(&mut self, key: Key, codes: &[&str]) {
        for code in codes {
            self.bindings.insert(code.to_string(), key);
        }
    }

    pub fn lookup(&self, code: &str) -> Option<Key> {
        self.bindings.get(code).copied()
    }
}

/// A physical key press or release, by key code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyEvent<'a> {
    Down(&'a str),
    Up(&'a str),
}

/// Tracks held keys from press/release events.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    map: KeyMap,
    keys: InputState,
}

impl Inputs {
    pub fn new(map: KeyMap) -> Inputs {
        Inputs {
            map,
            keys: InputState::default(),
        }
    }

    /// Returns the logical key if this press changed its state.
    pub fn down(&mut self, code: &str) -> Option<Key> {
        let key = self.map.lookup(code)?;
        if self.keys.get(key) {
            return None;
        }
        self.keys.set(key, true);
        Some(key)
    }

    /// Returns the logical key if this release changed its state.
    pub fn up(&mut self, code: &str) -> Option<Key> {
        let key = self.map.lookup(code)?;
        if !self.keys.get(key) {
            return None;
        }
        self.keys.set(key, false);
        Some(key)
    }

    pub fn apply(&mut self, event: KeyEvent) -> Option<Key> {
        match event {
            KeyEvent::Down(code) => self.down(code),
            KeyEvent::Up(code) => self.up(code),
        }
    }

    pub fn snapshot(&self) -> InputState {
        self.keys
    }
}
