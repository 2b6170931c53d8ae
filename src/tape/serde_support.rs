use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::sparsity::Sparsity;

use super::{Instruction, IoBlock, Tape};

impl Serialize for Tape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Tape", 4)?;
        s.serialize_field("instructions", &self.instructions)?;
        s.serialize_field("num_slots", &self.num_slots)?;
        s.serialize_field("inputs", &self.inputs)?;
        s.serialize_field("outputs", &self.outputs)?;
        s.end()
    }
}

/// Deserialization re-checks every pattern and the SSA ordering, so a
/// tampered document is rejected instead of indexing out of bounds later.
impl<'de> Deserialize<'de> for Tape {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct TapeData {
            instructions: Vec<Instruction>,
            num_slots: usize,
            inputs: Vec<IoBlock>,
            outputs: Vec<IoBlock>,
        }

        let data = TapeData::deserialize(deserializer)?;
        for block in data.inputs.iter().chain(&data.outputs) {
            let sp = &block.sparsity;
            Sparsity::new(sp.nrow(), sp.ncol(), sp.colind().to_vec(), sp.row().to_vec())
                .map_err(serde::de::Error::custom)?;
        }
        Tape::from_parts(data.instructions, data.num_slots, data.inputs, data.outputs)
            .map_err(serde::de::Error::custom)
    }
}
