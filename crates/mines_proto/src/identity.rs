//! Composite identity of one game instance.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A game is addressed by its player *and* the player's game sequence
/// number. Two games of the same player never share a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameKey {
    pub player: Address,
    pub game_id: U256,
}

impl GameKey {
    pub fn new(player: Address, game_id: U256) -> Self {
        Self { player, game_id }
    }

    /// Store id: `0x<lowercase player hex>-<decimal game id>`.
    pub fn entity_id(&self) -> String {
        format!("{}-{}", player_entity_id(&self.player), self.game_id)
    }
}

impl fmt::Display for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity_id().as_str())
    }
}

pub fn player_entity_id(player: &Address) -> String {
    format!("0x{}", hex::encode(player.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_combines_player_and_game_id() {
        let key = GameKey::new(Address::repeat_byte(0xab), U256::from(42_u64));
        assert_eq!(
            key.entity_id(),
            "0xabababababababababababababababababababab-42"
        );
    }

    #[test]
    fn same_player_different_game_ids_are_distinct_keys() {
        let player = Address::repeat_byte(0x01);
        let first = GameKey::new(player, U256::from(1_u64));
        let second = GameKey::new(player, U256::from(2_u64));
        assert_ne!(first, second);
        assert_ne!(first.entity_id(), second.entity_id());
    }
}
