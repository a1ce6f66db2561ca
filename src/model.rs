use crate::{error::Result, preprocess::ImageTensor};

/// The model host seen by the request path: one forward pass per call, no
/// state carried between calls.
pub trait Classifier: Send + Sync {
    /// Raw per-class scores for a `[1, S, S, 3]` tensor.
    fn infer(&self, input: &ImageTensor) -> Result<Vec<f32>>;

    /// Output width declared by the artifact, if it declares one.
    fn output_classes(&self) -> Option<usize> {
        None
    }

    /// Square input edge declared by the artifact, if it declares one.
    fn input_size(&self) -> Option<u32> {
        None
    }
}

#[cfg(feature = "tensorflow")]
pub use self::tf::TensorFlowModel;

#[cfg(feature = "tensorflow")]
mod tf {
    use std::path::Path;

    use tensorflow::{
        Graph, Operation, SavedModelBundle, SessionOptions, SessionRunArgs, Shape, Tensor,
        TensorInfo,
    };

    use super::Classifier;
    use crate::{
        config::ModelConfig,
        error::{PlantError, Result},
        preprocess::ImageTensor,
    };

    /// Graph operation plus output index, resolved from the serving signature.
    struct Endpoint {
        name: String,
        operation: Operation,
        index: i32,
    }

    pub struct TensorFlowModel {
        bundle: SavedModelBundle,
        input: Endpoint,
        output: Endpoint,
        output_classes: Option<usize>,
        input_size: Option<u32>,
    }

    impl TensorFlowModel {
        /// Loads the SavedModel at `config.path` and resolves the first input
        /// and first output of `config.signature`.
        pub fn load(config: &ModelConfig) -> Result<Self> {
            let path = config.path.as_path();
            if !path.exists() {
                return Err(PlantError::model_load(path, "no such directory"));
            }

            let mut graph = Graph::new();
            let bundle =
                SavedModelBundle::load(&SessionOptions::new(), &config.tags, &mut graph, path)
                    .map_err(|e| PlantError::model_load(path, e))?;

            let signature = bundle
                .meta_graph_def()
                .get_signature(&config.signature)
                .map_err(|e| PlantError::model_load(path, e))?;

            let (input_key, input_info) = first_entry(signature.inputs())
                .ok_or_else(|| PlantError::model_load(path, "signature has no inputs"))?;
            let (output_key, output_info) = first_entry(signature.outputs())
                .ok_or_else(|| PlantError::model_load(path, "signature has no outputs"))?;

            let input = resolve(&graph, path, input_info)?;
            let output = resolve(&graph, path, output_info)?;

            tracing::info!(
                "resolved signature `{}`: input `{}` -> {}, output `{}` -> {}",
                config.signature,
                input_key,
                input.name,
                output_key,
                output.name
            );

            let input_size = square_edge(input_info.shape());
            let output_classes = last_dim(output_info.shape());

            Ok(TensorFlowModel {
                bundle,
                input,
                output,
                output_classes,
                input_size,
            })
        }
    }

    impl Classifier for TensorFlowModel {
        fn infer(&self, input: &ImageTensor) -> Result<Vec<f32>> {
            let tensor = Tensor::<f32>::new(&input.shape())
                .with_values(input.as_slice())
                .map_err(|e| PlantError::Inference(e.to_string()))?;

            let mut args = SessionRunArgs::new();
            args.add_feed(&self.input.operation, self.input.index, &tensor);
            let token = args.request_fetch(&self.output.operation, self.output.index);

            self.bundle
                .session
                .run(&mut args)
                .map_err(|e| PlantError::Inference(e.to_string()))?;

            let scores: Tensor<f32> = args
                .fetch(token)
                .map_err(|e| PlantError::Inference(e.to_string()))?;

            Ok(scores.to_vec())
        }

        fn output_classes(&self) -> Option<usize> {
            self.output_classes
        }

        fn input_size(&self) -> Option<u32> {
            self.input_size
        }
    }

    // HashMap order is arbitrary; pick the smallest key so reloads agree.
    fn first_entry<V>(map: &std::collections::HashMap<String, V>) -> Option<(&String, &V)> {
        map.iter().min_by(|a, b| a.0.cmp(b.0))
    }

    fn resolve(graph: &Graph, path: &Path, info: &TensorInfo) -> Result<Endpoint> {
        let name = &info.name().name;
        let operation = graph
            .operation_by_name_required(name)
            .map_err(|e| PlantError::model_load(path, e))?;

        Ok(Endpoint {
            name: format!("{}:{}", name, info.name().index),
            operation,
            index: info.name().index,
        })
    }

    fn dim(shape: &Shape, i: usize) -> Option<i64> {
        match shape.dims() {
            Some(rank) if i < rank => shape[i].filter(|&d| d > 0),
            _ => None,
        }
    }

    fn last_dim(shape: &Shape) -> Option<usize> {
        let rank = shape.dims()?;
        dim(shape, rank.checked_sub(1)?).map(|d| d as usize)
    }

    fn square_edge(shape: &Shape) -> Option<u32> {
        match (dim(shape, 1), dim(shape, 2)) {
            (Some(h), Some(w)) if h == w => Some(h as u32),
            _ => None,
        }
    }

    #[cfg(test)]
    mod tests {
        use std::collections::HashMap;

        use super::*;

        fn shape(dims: &[Option<i64>]) -> Shape {
            Shape::from(Some(dims.to_vec()))
        }

        #[test]
        fn image_input_has_square_edge() {
            let input = shape(&[Some(-1), Some(224), Some(224), Some(3)]);
            assert_eq!(square_edge(&input), Some(224));
            assert_eq!(last_dim(&input), Some(3));
        }

        #[test]
        fn dynamic_spatial_dims_are_unknown() {
            let input = shape(&[Some(-1), None, Some(-1), Some(3)]);
            assert_eq!(square_edge(&input), None);

            let wide = shape(&[Some(1), Some(224), Some(300), Some(3)]);
            assert_eq!(square_edge(&wide), None);
        }

        #[test]
        fn unknown_rank_declares_nothing() {
            let unknown = Shape::from(None::<Vec<Option<i64>>>);
            assert_eq!(last_dim(&unknown), None);
            assert_eq!(square_edge(&unknown), None);
        }

        #[test]
        fn output_width_is_last_dim() {
            assert_eq!(last_dim(&shape(&[Some(-1), Some(5)])), Some(5));
            assert_eq!(last_dim(&shape(&[Some(-1), None])), None);
            assert_eq!(last_dim(&shape(&[])), None);
        }

        #[test]
        fn smallest_key_is_chosen() {
            let map: HashMap<String, u8> = [("output_2", 2), ("dense", 0), ("output_1", 1)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();

            let (key, value) = first_entry(&map).unwrap();
            assert_eq!(key, "dense");
            assert_eq!(*value, 0);
            assert!(first_entry(&HashMap::<String, u8>::new()).is_none());
        }
    }
}
